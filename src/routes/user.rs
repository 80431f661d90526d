use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use tracing::info;

use super::parse_id;
use crate::{
    database::Database,
    error::{AppError, AppResult},
    models::{
        points::find_history,
        user::{
            require_admin, require_user, Role, User, UserRegistrationRequest, UserRequest,
            UserRoleRequest,
        },
    },
};

/// Creates an approved account. The very first account bootstraps the
/// system as an admin; after that only admins may provision users.
#[post("/users")]
pub async fn create_user(
    db: web::Data<Database>,
    payload: web::Json<UserRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let payload: UserRequest = payload.into_inner();
    let issuer = require_admin(&req).ok();

    let user = db
        .run_in_transaction(move |tx| {
            let role = if User::count(tx)? == 0 {
                Role::Admin
            } else if issuer.is_some() {
                payload.role.unwrap_or(Role::User)
            } else {
                return Err(AppError::forbidden("Only admins can create users"));
            };
            let mut user = User::new(payload.name, payload.employee_id, role, true);
            user.save(tx)?;
            Ok(user)
        })
        .await?;

    info!(user_id = ?user.id, role = %user.role, "user created");
    Ok(HttpResponse::Created().json(user))
}
#[post("/users/register")]
pub async fn register_user(
    db: web::Data<Database>,
    payload: web::Json<UserRegistrationRequest>,
) -> AppResult<HttpResponse> {
    let payload: UserRegistrationRequest = payload.into_inner();
    let mut user = User::new(payload.name, payload.employee_id, Role::User, false);

    let user = db
        .run(move |conn| {
            user.save(conn)?;
            Ok(user)
        })
        .await?;

    info!(user_id = ?user.id, "self-registration awaiting approval");
    Ok(HttpResponse::Created().json(user))
}
#[get("/users")]
pub async fn get_users(db: web::Data<Database>, req: HttpRequest) -> AppResult<HttpResponse> {
    require_admin(&req)?;
    let users = db.run(|conn| User::find_many(conn)).await?;
    Ok(HttpResponse::Ok().json(users))
}
#[get("/users/me")]
pub async fn get_current_user(
    db: web::Data<Database>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let issuer = require_user(&req)?;
    let user = db
        .run(move |conn| User::find_by_id(conn, issuer.id))
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(user))
}
#[put("/users/{user_id}/approve")]
pub async fn approve_user(
    db: web::Data<Database>,
    user_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id)?;
    let user = db.run(move |conn| User::approve(conn, user_id)).await?;
    info!(user_id, "user approved");
    Ok(HttpResponse::Ok().json(user))
}
#[put("/users/{user_id}/role")]
pub async fn update_user_role(
    db: web::Data<Database>,
    user_id: web::Path<String>,
    payload: web::Json<UserRoleRequest>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    require_admin(&req)?;
    let user_id = parse_id(&user_id)?;
    let role = payload.into_inner().role;
    let user = db
        .run(move |conn| User::update_role(conn, user_id, role))
        .await?;
    info!(user_id, %role, "user role changed");
    Ok(HttpResponse::Ok().json(user))
}
#[get("/users/{user_id}/points-history")]
pub async fn get_points_history(
    db: web::Data<Database>,
    user_id: web::Path<String>,
    req: HttpRequest,
) -> AppResult<HttpResponse> {
    let issuer = require_user(&req)?;
    let user_id = parse_id(&user_id)?;
    if issuer.id != user_id && issuer.role != Role::Admin {
        return Err(AppError::forbidden("You can only view your own points history"));
    }
    let history = db.run(move |conn| find_history(conn, user_id)).await?;
    Ok(HttpResponse::Ok().json(history))
}
