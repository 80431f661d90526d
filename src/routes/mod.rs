use actix_web::{get, web, HttpResponse};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub mod calendar_event;
pub mod dropdown;
pub mod equipment;
pub mod leaderboard;
pub mod observation;
pub mod permit;
pub mod quiz;
pub mod status_log;
pub mod toolbox_talk;
pub mod training;
pub mod user;
pub mod verification;

#[get("/health")]
pub async fn get_health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub(crate) fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("Invalid id: {raw}")))
}

/// Registers every `/api` route plus extractor error mapping.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| AppError::validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(get_health)
            .service(user::create_user)
            .service(user::register_user)
            .service(user::get_users)
            .service(user::get_current_user)
            .service(user::approve_user)
            .service(user::update_user_role)
            .service(user::get_points_history)
            .service(leaderboard::get_leaderboard)
            .service(observation::get_observations)
            .service(observation::get_observation)
            .service(observation::create_observation)
            .service(observation::update_corrective_action)
            .service(observation::delete_observation)
            .service(verification::get_pending_count)
            .service(verification::get_pending)
            .service(verification::approve)
            .service(verification::reject)
            .service(verification::get_history)
            .service(status_log::get_status_log)
            .service(permit::get_permits)
            .service(permit::create_permit)
            .service(permit::close_permit)
            .service(permit::delete_permit)
            .service(toolbox_talk::get_toolbox_talks)
            .service(toolbox_talk::create_toolbox_talk)
            .service(toolbox_talk::delete_toolbox_talk)
            .service(equipment::get_equipment_list)
            .service(equipment::get_inspections_due)
            .service(equipment::get_equipment)
            .service(equipment::create_equipment)
            .service(equipment::update_equipment_status)
            .service(equipment::delete_equipment)
            .service(calendar_event::get_calendar_events)
            .service(calendar_event::get_calendar_event)
            .service(calendar_event::create_calendar_event)
            .service(calendar_event::update_calendar_event)
            .service(calendar_event::delete_calendar_event)
            .service(training::get_training_matrix)
            .service(training::get_user_training)
            .service(training::create_training_record)
            .service(training::delete_training_record)
            .service(quiz::get_quiz_questions)
            .service(quiz::create_quiz_question)
            .service(quiz::answer_quiz_question)
            .service(quiz::delete_quiz_question)
            .service(dropdown::get_dropdown_options),
    );
}
