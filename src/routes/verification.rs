use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        observation::Observation,
        user::{require_role, require_user, VERIFIER_ROLES},
        verification::{Verification, VerificationRequest},
    },
};

#[get("/verifications/pending")]
pub async fn get_pending(db: web::Data<Database>, req: HttpRequest) -> AppResult<HttpResponse> {
    require_role(&req, &VERIFIER_ROLES)?;
    let pending = db.run(|conn| Verification::find_pending(conn)).await?;
    Ok(HttpResponse::Ok().json(pending))
}
#[get("/verifications/pending/count")]
pub async fn get_pending_count(
    db: web::Data<Database>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_role(&req, &VERIFIER_ROLES)?;
    let count = db.run(|conn| Verification::count_pending(conn)).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}
#[post("/verifications/{observation_id}/approve")]
pub async fn approve(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    payload: web::Json<VerificationRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let verifier = require_role(&req, &VERIFIER_ROLES)?;
    let observation_id = parse_id(&observation_id)?;
    let remarks = payload.into_inner().remarks;

    let outcome = db
        .run_in_transaction(move |tx| {
            Verification::approve(tx, observation_id, &verifier, &remarks)
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Observation verified and closed",
        "verification_id": outcome.verification_id,
        "decision": outcome.decision,
        "points_awarded": outcome.points_awarded,
    })))
}
#[post("/verifications/{observation_id}/reject")]
pub async fn reject(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    payload: web::Json<VerificationRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let verifier = require_role(&req, &VERIFIER_ROLES)?;
    let observation_id = parse_id(&observation_id)?;
    let remarks = payload.into_inner().remarks;

    let outcome = db
        .run_in_transaction(move |tx| {
            Verification::reject(tx, observation_id, &verifier, &remarks)
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Corrective action sent back for rework",
        "verification_id": outcome.verification_id,
        "decision": outcome.decision,
        "points_awarded": outcome.points_awarded,
    })))
}
#[get("/verifications/history/{observation_id}")]
pub async fn get_history(
    db: web::Data<Database>,
    observation_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_user(&req)?;
    let observation_id = parse_id(&observation_id)?;
    let history = db
        .run(move |conn| {
            if Observation::find_by_id(conn, observation_id)?.is_none() {
                return Err(AppError::not_found("Observation not found"));
            }
            Verification::find_history(conn, observation_id)
        })
        .await?;
    Ok(HttpResponse::Ok().json(history))
}

#[cfg(test)]
mod tests {
    use crate::{
        database::Database,
        models::{observation::RiskLevel, user::Role},
        test_support::{observation_request, seed_user, test_app, TestUser},
    };
    use actix_web::{
        dev::{Service, ServiceResponse},
        http::StatusCode,
        test as actix_test,
    };
    use serde_json::{json, Value};

    async fn completed_observation(
        app: &impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
        reporter: &TestUser,
    ) -> i64 {
        let mut request = observation_request();
        request.risk_level = RiskLevel::High;
        let req = actix_test::TestRequest::post()
            .uri("/api/observations")
            .insert_header(reporter.bearer())
            .set_json(request)
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(app, req).await;
        let id = body["id"].as_i64().expect("id");

        let req = actix_test::TestRequest::put()
            .uri(&format!("/api/observations/{id}/corrective-action"))
            .insert_header(reporter.bearer())
            .set_json(json!({ "status": "Completed" }))
            .to_request();
        let res = actix_test::call_service(app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        id
    }

    async fn points_of(
        app: &impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
        user: &TestUser,
    ) -> i64 {
        let req = actix_test::TestRequest::get()
            .uri("/api/users/me")
            .insert_header(user.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(app, req).await;
        body["points"].as_i64().expect("points")
    }

    #[actix_web::test]
    async fn approving_closes_the_observation_and_credits_the_reporter() {
        let db = Database::open_in_memory().expect("db");
        let reporter = seed_user(&db, "Ana", "EMP-1", Role::User);
        let verifier = seed_user(&db, "Hana", "HSE-1", Role::Hse);
        let app = actix_test::init_service(test_app(&db)).await;

        let id = completed_observation(&app, &reporter).await;
        let before = points_of(&app, &reporter).await;

        let req = actix_test::TestRequest::get()
            .uri("/api/verifications/pending/count")
            .insert_header(verifier.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/approve"))
            .insert_header(verifier.bearer())
            .set_json(json!({ "remarks": "verified onsite" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["points_awarded"], true);

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/observations/{id}"))
            .insert_header(verifier.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "Closed");
        assert_eq!(body["closed_by"], "Hana");
        assert_eq!(body["closed_notes"], "verified onsite");

        assert_eq!(points_of(&app, &reporter).await, before + 5);

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/verifications/history/{id}"))
            .insert_header(reporter.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["decision"], "APPROVED");
        assert_eq!(body[0]["verifier_name"], "Hana");

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/approve"))
            .insert_header(verifier.bearer())
            .set_json(json!({ "remarks": "again" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn rejecting_reopens_the_corrective_action() {
        let db = Database::open_in_memory().expect("db");
        let reporter = seed_user(&db, "Ana", "EMP-1", Role::User);
        let verifier = seed_user(&db, "Sam", "SO-1", Role::SafetyOfficer);
        let app = actix_test::init_service(test_app(&db)).await;

        let id = completed_observation(&app, &reporter).await;
        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/reject"))
            .insert_header(verifier.bearer())
            .set_json(json!({ "remarks": "guard rail still missing" }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["points_awarded"], false);

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/observations/{id}"))
            .insert_header(verifier.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "Open");
        assert_eq!(body["corrective_action_status"], "In Progress");

        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/status-log/observation/{id}"))
            .insert_header(verifier.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        let last = body.as_array().and_then(|rows| rows.last()).expect("log row");
        assert_eq!(last["new_status"], "In Progress");
        assert_eq!(last["remarks"], "guard rail still missing");
    }

    #[actix_web::test]
    async fn decisions_are_guarded() {
        let db = Database::open_in_memory().expect("db");
        let reporter = seed_user(&db, "Ana", "EMP-1", Role::Hse);
        let worker = seed_user(&db, "Ben", "EMP-2", Role::User);
        let verifier = seed_user(&db, "Hana", "HSE-1", Role::Hse);
        let app = actix_test::init_service(test_app(&db)).await;
        let id = completed_observation(&app, &reporter).await;

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/approve"))
            .set_json(json!({ "remarks": "ok" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/approve"))
            .insert_header(worker.bearer())
            .set_json(json!({ "remarks": "ok" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/approve"))
            .insert_header(reporter.bearer())
            .set_json(json!({ "remarks": "looks fine to me" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/verifications/{id}/reject"))
            .insert_header(verifier.bearer())
            .set_json(json!({ "remarks": "   " }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::post()
            .uri("/api/verifications/9999/approve")
            .insert_header(verifier.bearer())
            .set_json(json!({ "remarks": "ok" }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let req = actix_test::TestRequest::get()
            .uri("/api/verifications/pending")
            .insert_header(worker.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn history_of_an_unknown_observation_is_not_found() {
        let db = Database::open_in_memory().expect("db");
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let app = actix_test::init_service(test_app(&db)).await;

        let req = actix_test::TestRequest::get()
            .uri("/api/verifications/history/9999")
            .insert_header(ana.bearer())
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let id = completed_observation(&app, &ana).await;
        let req = actix_test::TestRequest::get()
            .uri(&format!("/api/verifications/history/{id}"))
            .insert_header(ana.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([]));
    }
}
