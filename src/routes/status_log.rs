use actix_web::{get, web, HttpRequest, HttpResponse};

use crate::{
    database::Database,
    error::AppResult,
    models::{
        status_log::{StatusLog, StatusLogPath},
        user::require_user,
    },
};

#[get("/status-log/{entity_type}/{entity_id}")]
pub async fn get_status_log(
    db: web::Data<Database>,
    path: web::Path<StatusLogPath>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let StatusLogPath {
        entity_type,
        entity_id,
    } = path.into_inner();
    let entries = db
        .run(move |conn| StatusLog::find_by_entity(conn, entity_type, entity_id))
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}
