use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::AppResult,
    models::{
        toolbox_talk::{ToolboxTalk, ToolboxTalkRequest},
        user::{require_admin, require_user},
    },
};

#[get("/toolbox-talks")]
pub async fn get_toolbox_talks(
    db: web::Data<Database>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let talks = db.run(|conn| ToolboxTalk::find_many(conn)).await?;
    Ok(HttpResponse::Ok().json(talks))
}
#[post("/toolbox-talks")]
pub async fn create_toolbox_talk(
    db: web::Data<Database>,
    payload: web::Json<ToolboxTalkRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let presenter = require_user(&req)?;
    let mut talk = ToolboxTalk::from_request(payload.into_inner(), &presenter);

    let talk = db
        .run_in_transaction(move |tx| {
            talk.save(tx)?;
            Ok(talk)
        })
        .await?;
    Ok(HttpResponse::Created().json(talk))
}
#[delete("/toolbox-talks/{toolbox_talk_id}")]
pub async fn delete_toolbox_talk(
    db: web::Data<Database>,
    toolbox_talk_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let toolbox_talk_id = parse_id(&toolbox_talk_id)?;
    db.run(move |conn| ToolboxTalk::delete_by_id(conn, toolbox_talk_id))
        .await?;
    info!(toolbox_talk_id, admin_id = admin.id, "toolbox talk deleted");
    Ok(HttpResponse::NoContent().finish())
}
