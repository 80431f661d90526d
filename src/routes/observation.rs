use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        observation::{CorrectiveActionRequest, Observation, ObservationQuery, ObservationRequest},
        user::{require_admin, require_user},
    },
};

#[get("/observations")]
pub async fn get_observations(
    db: web::Data<Database>,
    query: web::Query<ObservationQuery>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let query = query.into_inner();
    let observations = db
        .run(move |conn| Observation::find_many(conn, &query))
        .await?;
    Ok(HttpResponse::Ok().json(observations))
}
#[get("/observations/{observation_id}")]
pub async fn get_observation(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let observation_id = parse_id(&observation_id)?;
    let observation = db
        .run(move |conn| Observation::find_by_id(conn, observation_id))
        .await?
        .ok_or_else(|| AppError::not_found("Observation not found"))?;
    Ok(HttpResponse::Ok().json(observation))
}
#[post("/observations")]
pub async fn create_observation(
    db: web::Data<Database>,
    payload: web::Json<ObservationRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let reporter = require_user(&req)?;
    let mut observation = Observation::from_request(payload.into_inner(), &reporter);

    let observation = db
        .run_in_transaction(move |tx| {
            observation.report(tx, reporter.id)?;
            Ok(observation)
        })
        .await?;
    Ok(HttpResponse::Created().json(observation))
}
#[put("/observations/{observation_id}/corrective-action")]
pub async fn update_corrective_action(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    payload: web::Json<CorrectiveActionRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let actor = require_user(&req)?;
    let observation_id = parse_id(&observation_id)?;
    let payload = payload.into_inner();

    let observation = db
        .run_in_transaction(move |tx| {
            Observation::update_corrective_action(tx, observation_id, &payload, &actor)
        })
        .await?;
    Ok(HttpResponse::Ok().json(observation))
}
#[delete("/observations/{observation_id}")]
pub async fn delete_observation(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let observation_id = parse_id(&observation_id)?;
    db.run_in_transaction(move |tx| Observation::delete_by_id(tx, observation_id))
        .await?;
    info!(observation_id, admin_id = admin.id, "observation deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::{
        database::Database,
        models::user::Role,
        test_support::{observation_request, seed_user, test_app},
    };
    use actix_web::{http::StatusCode, test as actix_test};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn reporting_requires_an_approved_account() {
        let db = Database::open_in_memory().expect("db");
        let app = actix_test::init_service(test_app(&db)).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .set_json(observation_request())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn reported_observations_start_open() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let app = actix_test::init_service(test_app(&db)).await;

        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .insert_header(ana.bearer())
            .set_json(observation_request())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["status"], "Open");
        assert_eq!(body["corrective_action_status"], "Not Started");
        assert_eq!(body["reported_by"], "Ana");
        assert_eq!(body["evidence"], json!([]));

        let id = body["id"].as_i64().expect("id");
        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/observations/{id}"))
            .insert_header(ana.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["area"], "Yard");
    }

    #[actix_web::test]
    async fn invalid_payloads_and_ids_are_bad_requests() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let app = actix_test::init_service(test_app(&db)).await;

        let mut request = observation_request();
        request.date = "yesterday".into();
        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .insert_header(ana.bearer())
            .set_json(request)
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::get()
            .uri("/api/observations/not-a-number")
            .insert_header(ana.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::get()
            .uri("/api/observations/404")
            .insert_header(ana.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn corrective_action_guards_illegal_moves() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let app = actix_test::init_service(test_app(&db)).await;

        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .insert_header(ana.bearer())
            .set_json(observation_request())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        let id = body["id"].as_i64().expect("id");

        let req = actix_test::TestRequest::put()
            .uri(&format!("/api/observations/{id}/corrective-action"))
            .insert_header(ana.bearer())
            .set_json(json!({ "status": "In Progress", "due_date": "2024-06-01", "assigned_to": "Ben" }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["corrective_action_status"], "In Progress");
        assert_eq!(body["corrective_action_assigned_to"], "Ben");

        let req = actix_test::TestRequest::put()
            .uri(&format!("/api/observations/{id}/corrective-action"))
            .insert_header(ana.bearer())
            .set_json(json!({ "status": "Not Started" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn only_admins_delete() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let root = seed_user(&db, "Root", "ADM-1", Role::Admin);
        let app = actix_test::init_service(test_app(&db)).await;

        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .insert_header(ana.bearer())
            .set_json(observation_request())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        let id = body["id"].as_i64().expect("id");

        let req = actix_test::TestRequest::delete()
            .uri(&format!("/api/observations/{id}"))
            .insert_header(ana.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = actix_test::TestRequest::delete()
            .uri(&format!("/api/observations/{id}"))
            .insert_header(root.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }
}
