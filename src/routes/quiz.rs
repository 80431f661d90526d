use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::AppResult,
    models::{
        quiz::{QuizAnswerRequest, QuizQuestion, QuizQuestionRequest},
        user::{require_admin, require_user},
    },
};

#[get("/quiz/questions")]
pub async fn get_quiz_questions(
    db: web::Data<Database>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let player = require_user(&req)?;
    let questions = db
        .run(move |conn| QuizQuestion::find_for_player(conn, player.id))
        .await?;
    Ok(HttpResponse::Ok().json(questions))
}
#[post("/quiz/questions")]
pub async fn create_quiz_question(
    db: web::Data<Database>,
    payload: web::Json<QuizQuestionRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_admin(&req)?;
    let mut question = QuizQuestion::from_request(payload.into_inner());

    let question = db
        .run(move |conn| {
            question.save(conn)?;
            Ok(question)
        })
        .await?;
    Ok(HttpResponse::Created().json(question))
}
#[post("/quiz/questions/{question_id}/answer")]
pub async fn answer_quiz_question(
    db: web::Data<Database>,
    question_id: web::Path<String>,
    payload: web::Json<QuizAnswerRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let player = require_user(&req)?;
    let question_id = parse_id(&question_id)?;
    let option = payload.into_inner().option;

    let outcome = db
        .run_in_transaction(move |tx| QuizQuestion::answer(tx, question_id, &player, option))
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}
#[delete("/quiz/questions/{question_id}")]
pub async fn delete_quiz_question(
    db: web::Data<Database>,
    question_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let admin = require_admin(&req)?;
    let question_id = parse_id(&question_id)?;
    db.run(move |conn| QuizQuestion::delete_by_id(conn, question_id))
        .await?;
    info!(question_id, admin_id = admin.id, "quiz question deleted");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::{
        database::Database,
        models::user::Role,
        test_support::{seed_user, test_app},
    };
    use actix_web::{http::StatusCode, test as actix_test};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn players_answer_each_question_once() {
        let db = Database::open_in_memory().expect("db");
        let root = seed_user(&db, "Root", "EMP-0", Role::Admin);
        let ana = seed_user(&db, "Ana", "EMP-1", Role::User);
        let app = actix_test::init_service(test_app(&db)).await;

        let question = json!({
            "question": "What is the first step before confined space entry?",
            "options": ["Gas test", "Enter quickly", "Remove PPE"],
            "correct_option": 0,
            "points": 15,
        });
        let req = actix_test::TestRequest::post()
            .uri("/api/quiz/questions")
            .insert_header(ana.bearer())
            .set_json(&question)
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = actix_test::TestRequest::post()
            .uri("/api/quiz/questions")
            .insert_header(root.bearer())
            .set_json(&question)
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = actix_test::read_body_json(res).await;
        let id = body["id"].as_i64().expect("id");

        let req = actix_test::TestRequest::get()
            .uri("/api/quiz/questions")
            .insert_header(ana.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["answered"], false);
        assert!(body[0].get("correct_option").is_none());

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/quiz/questions/{id}/answer"))
            .insert_header(ana.bearer())
            .set_json(json!({ "option": 0 }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "correct": true, "points_awarded": 15 }));

        let req = actix_test::TestRequest::post()
            .uri(&format!("/api/quiz/questions/{id}/answer"))
            .insert_header(ana.bearer())
            .set_json(json!({ "option": 1 }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let req = actix_test::TestRequest::get()
            .uri("/api/users/me")
            .insert_header(ana.bearer())
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["points"], 15);

        let req = actix_test::TestRequest::post()
            .uri("/api/quiz/questions/9999/answer")
            .insert_header(ana.bearer())
            .set_json(json!({ "option": 0 }))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
