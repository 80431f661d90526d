use actix_web::{get, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    database::Database,
    error::AppResult,
    models::{
        points::{leaderboard, rank_of},
        user::optional_user,
    },
};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct LeaderboardQueryParams {
    pub limit: Option<i64>,
}

/// Public ranking; signed-in callers also get their own position.
#[get("/leaderboard")]
pub async fn get_leaderboard(
    db: web::Data<Database>,
    query: web::Query<LeaderboardQueryParams>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let caller = optional_user(&req).map(|user| user.id);

    let (entries, my_rank) = db
        .run(move |conn| {
            let entries = leaderboard(conn, limit)?;
            let my_rank = match caller {
                Some(user_id) => rank_of(conn, user_id)?,
                None => None,
            };
            Ok((entries, my_rank))
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "entries": entries,
        "my_rank": my_rank,
    })))
}
