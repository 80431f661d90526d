use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        training::{TrainingRecord, TrainingRecordRequest, TRAINING_RECORDER_ROLES},
        user::{require_admin, require_role, require_user},
    },
};

#[get("/training/matrix")]
pub async fn get_training_matrix(
    db: web::Data<Database>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let today = Utc::now().date_naive();
    let matrix = db
        .run(move |conn| TrainingRecord::matrix(conn, today))
        .await?;
    Ok(HttpResponse::Ok().json(matrix))
}
#[get("/training/users/{user_id}")]
pub async fn get_user_training(
    db: web::Data<Database>,
    user_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let viewer = require_user(&req)?;
    let user_id = parse_id(&user_id)?;
    if viewer.id != user_id && !viewer.has_role(&TRAINING_RECORDER_ROLES) {
        return Err(AppError::forbidden("Cannot view another user's training"));
    }
    let records = db
        .run(move |conn| TrainingRecord::find_by_user(conn, user_id))
        .await?;
    Ok(HttpResponse::Ok().json(records))
}
#[post("/training/records")]
pub async fn create_training_record(
    db: web::Data<Database>,
    payload: web::Json<TrainingRecordRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let recorder = require_role(&req, &TRAINING_RECORDER_ROLES)?;
    let mut record = TrainingRecord::from_request(payload.into_inner(), &recorder);

    let record = db
        .run(move |conn| {
            record.save(conn)?;
            Ok(record)
        })
        .await?;
    Ok(HttpResponse::Created().json(record))
}
#[delete("/training/records/{record_id}")]
pub async fn delete_training_record(
    db: web::Data<Database>,
    record_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let record_id = parse_id(&record_id)?;
    db.run(move |conn| TrainingRecord::delete_by_id(conn, record_id))
        .await?;
    info!(record_id, admin_id = admin.id, "training record deleted");
    Ok(HttpResponse::NoContent().finish())
}
