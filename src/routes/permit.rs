use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::AppResult,
    models::{
        permit::{Permit, PermitCloseRequest, PermitQuery, PermitRequest},
        user::{require_admin, require_user},
    },
};

#[get("/permits")]
pub async fn get_permits(
    db: web::Data<Database>,
    query: web::Query<PermitQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let query = query.into_inner();
    let permits = db.run(move |conn| Permit::find_many(conn, &query)).await?;
    Ok(HttpResponse::Ok().json(permits))
}
#[post("/permits")]
pub async fn create_permit(
    db: web::Data<Database>,
    payload: web::Json<PermitRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let issuer = require_user(&req)?;
    let mut permit = Permit::from_request(payload.into_inner(), &issuer);

    let permit = db
        .run_in_transaction(move |tx| {
            permit.save(tx)?;
            Ok(permit)
        })
        .await?;
    Ok(HttpResponse::Created().json(permit))
}
#[put("/permits/{permit_id}/close")]
pub async fn close_permit(
    db: web::Data<Database>,
    permit_id: web::Path<String>,
    payload: web::Json<PermitCloseRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let closer = require_user(&req)?;
    let permit_id = parse_id(&permit_id)?;
    let remarks = payload.into_inner().remarks;

    let permit = db
        .run_in_transaction(move |tx| Permit::close(tx, permit_id, &closer, &remarks))
        .await?;
    Ok(HttpResponse::Ok().json(permit))
}
#[delete("/permits/{permit_id}")]
pub async fn delete_permit(
    db: web::Data<Database>,
    permit_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let permit_id = parse_id(&permit_id)?;
    db.run_in_transaction(move |tx| Permit::delete_by_id(tx, permit_id))
        .await?;
    info!(permit_id, admin_id = admin.id, "permit deleted");
    Ok(HttpResponse::NoContent().finish())
}
