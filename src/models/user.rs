use actix_service::{self, Transform};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse},
    http::header,
    web, Error, HttpMessage, HttpRequest,
};
use chrono::Utc;
use futures::{
    future::{ready, LocalBoxFuture, Ready},
    FutureExt,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::{rc::Rc, sync::OnceLock};
use tracing::{debug, warn};

use super::{now, points::Level, require_text};
use crate::{
    database::Database,
    error::{AppError, AppResult},
};

const ISSUER: &str = "safetrack";

text_enum! {
    Role {
        Admin => "admin",
        User => "user",
        SafetyOfficer => "safety_officer",
        Hse => "hse",
        Supervisor => "supervisor",
    }
}

/// Roles allowed to approve or reject corrective actions.
pub const VERIFIER_ROLES: [Role; 3] = [Role::Admin, Role::SafetyOfficer, Role::Hse];

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    sub: String,
    role: Role,
    iss: String,
    exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub employee_id: String,
    pub role: Role,
    pub points: i64,
    pub level: Level,
    pub approved: bool,
    pub created_at: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct UserRequest {
    pub name: String,
    pub employee_id: String,
    pub role: Option<Role>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct UserRegistrationRequest {
    pub name: String,
    pub employee_id: String,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct UserRoleRequest {
    pub role: Role,
}
#[derive(Debug, Clone)]
pub struct UserAuthenticationData {
    pub id: i64,
    pub name: String,
    pub employee_id: String,
    pub role: Role,
    pub approved: bool,
}
pub struct UserAuthenticationMiddleware<S> {
    service: Rc<S>,
}
pub struct UserAuthenticationMiddlewareFactory;

pub type UserAuthentication = Rc<UserAuthenticationData>;

/// Signing material for bearer tokens.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

fn employee_id_regex() -> &'static Regex {
    static EMPLOYEE_ID: OnceLock<Regex> = OnceLock::new();
    EMPLOYEE_ID
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{2,32}$").expect("valid employee id pattern"))
}

impl User {
    const COLUMNS: &'static str =
        "id, name, employee_id, role, points, level, approved, created_at";

    pub fn new(name: String, employee_id: String, role: Role, approved: bool) -> Self {
        Self {
            id: None,
            name,
            employee_id,
            role,
            points: 0,
            level: Level::Bronze,
            approved,
            created_at: now(),
        }
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            employee_id: row.get("employee_id")?,
            role: row.get("role")?,
            points: row.get("points")?,
            level: row.get("level")?,
            approved: row.get("approved")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn save(&mut self, conn: &Connection) -> AppResult<i64> {
        require_text("Name", &self.name)?;
        if !employee_id_regex().is_match(&self.employee_id) {
            return Err(AppError::validation(
                "Employee ID must be 2-32 letters, digits, '-' or '_'",
            ));
        }
        if Self::find_by_employee_id(conn, &self.employee_id)?.is_some() {
            return Err(AppError::conflict("Employee ID is already registered"));
        }

        conn.execute(
            "INSERT INTO users (name, employee_id, role, points, level, approved, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.name.trim(),
                self.employee_id,
                self.role,
                self.points,
                self.level,
                self.approved,
                self.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }
    pub fn count(conn: &Connection) -> AppResult<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }
    pub fn find_many(conn: &Connection) -> AppResult<Vec<User>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY name ASC",
            Self::COLUMNS
        ))?;
        let users = stmt
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
    pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<User>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", Self::COLUMNS),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }
    pub fn find_by_employee_id(conn: &Connection, employee_id: &str) -> AppResult<Option<User>> {
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM users WHERE employee_id = ?1", Self::COLUMNS),
                params![employee_id],
                Self::from_row,
            )
            .optional()?)
    }
    pub fn approve(conn: &Connection, id: i64) -> AppResult<User> {
        conn.execute("UPDATE users SET approved = 1 WHERE id = ?1", params![id])?;
        Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User not found"))
    }
    pub fn update_role(conn: &Connection, id: i64, role: Role) -> AppResult<User> {
        conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role, id],
        )?;
        Self::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User not found"))
    }
}

impl AuthKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a bearer token carrying the user's id and role.
    pub fn issue(&self, user_id: i64, role: Role, ttl_secs: i64) -> AppResult<String> {
        let claims = UserClaims {
            sub: user_id.to_string(),
            role,
            iss: ISSUER.to_string(),
            exp: Utc::now().timestamp() + ttl_secs,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Returns the user id a valid token was issued for.
    pub fn verify(&self, token: &str) -> AppResult<i64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        let data = decode::<UserClaims>(token, &self.decoding, &validation)?;
        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("Malformed token subject"))
    }
}

impl UserAuthenticationData {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

/// Principal for routes that behave differently for signed-in callers.
pub fn optional_user(req: &HttpRequest) -> Option<UserAuthenticationData> {
    req.extensions()
        .get::<UserAuthentication>()
        .map(|auth| auth.as_ref().clone())
}

/// Principal for routes restricted to approved accounts.
pub fn require_user(req: &HttpRequest) -> AppResult<UserAuthenticationData> {
    let user = optional_user(req).ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if !user.approved {
        return Err(AppError::forbidden("Account is pending approval"));
    }
    Ok(user)
}

/// Principal for routes restricted to a set of roles.
pub fn require_role(req: &HttpRequest, roles: &[Role]) -> AppResult<UserAuthenticationData> {
    let user = require_user(req)?;
    if !user.has_role(roles) {
        return Err(AppError::forbidden("Insufficient role for this action"));
    }
    Ok(user)
}

pub fn require_admin(req: &HttpRequest) -> AppResult<UserAuthenticationData> {
    require_role(req, &[Role::Admin])
}

async fn authenticate(req: &ServiceRequest) -> Option<UserAuthenticationData> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim()
        .to_string();
    let keys = req.app_data::<web::Data<AuthKeys>>()?;
    let db: Database = req.app_data::<web::Data<Database>>()?.get_ref().clone();

    let user_id = match keys.verify(&token) {
        Ok(user_id) => user_id,
        Err(error) => {
            debug!(%error, "rejected bearer token");
            return None;
        }
    };

    match db.run(move |conn| User::find_by_id(conn, user_id)).await {
        Ok(Some(user)) => Some(UserAuthenticationData {
            id: user_id,
            name: user.name,
            employee_id: user.employee_id,
            role: user.role,
            approved: user.approved,
        }),
        Ok(None) => {
            debug!(user_id, "token for unknown user");
            None
        }
        Err(error) => {
            warn!(%error, "could not load token user");
            None
        }
    }
}

impl<S, B> Service<ServiceRequest> for UserAuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv: Rc<S> = self.service.clone();

        async move {
            if let Some(auth_data) = authenticate(&req).await {
                req.extensions_mut()
                    .insert::<UserAuthentication>(Rc::new(auth_data));
            }
            let res: ServiceResponse<B> = srv.call(req).await?;
            Ok(res)
        }
        .boxed_local()
    }
}
impl<S, B> Transform<S, ServiceRequest> for UserAuthenticationMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = UserAuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(UserAuthenticationMiddleware {
            service: Rc::new(service),
        }))
    }
}
