use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        calendar_event::{CalendarEvent, CalendarEventRequest, CalendarQuery},
        user::require_user,
    },
};

#[get("/calendar-events")]
pub async fn get_calendar_events(
    db: web::Data<Database>,
    query: web::Query<CalendarQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let query = query.into_inner();
    let events = db
        .run(move |conn| CalendarEvent::find_many(conn, &query))
        .await?;
    Ok(HttpResponse::Ok().json(events))
}
#[get("/calendar-events/{event_id}")]
pub async fn get_calendar_event(
    db: web::Data<Database>,
    event_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let event_id = parse_id(&event_id)?;
    let event = db
        .run(move |conn| CalendarEvent::find_by_id(conn, event_id))
        .await?
        .ok_or_else(|| AppError::not_found("Calendar event not found"))?;
    Ok(HttpResponse::Ok().json(event))
}
#[post("/calendar-events")]
pub async fn create_calendar_event(
    db: web::Data<Database>,
    payload: web::Json<CalendarEventRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let creator = require_user(&req)?;
    let mut event = CalendarEvent::from_request(payload.into_inner(), &creator);

    let event = db
        .run(move |conn| {
            event.save(conn)?;
            Ok(event)
        })
        .await?;
    Ok(HttpResponse::Created().json(event))
}
#[put("/calendar-events/{event_id}")]
pub async fn update_calendar_event(
    db: web::Data<Database>,
    event_id: web::Path<String>,
    payload: web::Json<CalendarEventRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let actor = require_user(&req)?;
    let event_id = parse_id(&event_id)?;
    let request = payload.into_inner();

    let event = db
        .run_in_transaction(move |tx| CalendarEvent::update(tx, event_id, request, &actor))
        .await?;
    Ok(HttpResponse::Ok().json(event))
}
#[delete("/calendar-events/{event_id}")]
pub async fn delete_calendar_event(
    db: web::Data<Database>,
    event_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let actor = require_user(&req)?;
    let event_id = parse_id(&event_id)?;
    let actor_id = actor.id;
    db.run_in_transaction(move |tx| CalendarEvent::delete_by_id(tx, event_id, &actor))
        .await?;
    info!(event_id, actor_id, "calendar event deleted");
    Ok(HttpResponse::NoContent().finish())
}
