use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        equipment::{
            Equipment, EquipmentQuery, EquipmentRequest, EquipmentStatusRequest,
            InspectionsDueQuery,
        },
        today,
        user::{require_admin, require_user},
    },
};

#[get("/equipment")]
pub async fn get_equipment_list(
    db: web::Data<Database>,
    query: web::Query<EquipmentQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let query = query.into_inner();
    let equipment = db.run(move |conn| Equipment::find_many(conn, &query)).await?;
    Ok(HttpResponse::Ok().json(equipment))
}
#[get("/equipment/inspections-due")]
pub async fn get_inspections_due(
    db: web::Data<Database>,
    query: web::Query<InspectionsDueQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let before = query.into_inner().before.unwrap_or_else(today);
    let equipment = db
        .run(move |conn| Equipment::find_inspections_due(conn, &before))
        .await?;
    Ok(HttpResponse::Ok().json(equipment))
}
#[get("/equipment/{equipment_id}")]
pub async fn get_equipment(
    db: web::Data<Database>,
    equipment_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let equipment_id = parse_id(&equipment_id)?;
    let equipment = db
        .run(move |conn| Equipment::find_by_id(conn, equipment_id))
        .await?
        .ok_or_else(|| AppError::not_found("Equipment not found"))?;
    Ok(HttpResponse::Ok().json(equipment))
}
#[post("/equipment")]
pub async fn create_equipment(
    db: web::Data<Database>,
    payload: web::Json<EquipmentRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let registrar = require_user(&req)?;
    let mut equipment = Equipment::from_request(payload.into_inner(), &registrar);

    let equipment = db
        .run_in_transaction(move |tx| {
            equipment.save(tx)?;
            Ok(equipment)
        })
        .await?;
    Ok(HttpResponse::Created().json(equipment))
}
#[put("/equipment/{equipment_id}/status")]
pub async fn update_equipment_status(
    db: web::Data<Database>,
    equipment_id: web::Path<String>,
    payload: web::Json<EquipmentStatusRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let actor = require_user(&req)?;
    let equipment_id = parse_id(&equipment_id)?;
    let request = payload.into_inner();

    let equipment = db
        .run_in_transaction(move |tx| {
            Equipment::update_status(tx, equipment_id, &request, &actor)
        })
        .await?;
    Ok(HttpResponse::Ok().json(equipment))
}
#[delete("/equipment/{equipment_id}")]
pub async fn delete_equipment(
    db: web::Data<Database>,
    equipment_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let equipment_id = parse_id(&equipment_id)?;
    db.run_in_transaction(move |tx| Equipment::delete_by_id(tx, equipment_id))
        .await?;
    info!(equipment_id, admin_id = admin.id, "equipment deleted");
    Ok(HttpResponse::NoContent().finish())
}
