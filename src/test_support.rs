//! Shared fixtures for model and handler tests.

use actix_web::{web, App};

use crate::{
    database::Database,
    models::{
        observation::{ObservationClass, ObservationRequest, RiskLevel},
        user::{AuthKeys, Role, User, UserAuthenticationData, UserAuthenticationMiddlewareFactory},
    },
    routes,
};

pub const TEST_SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
    pub employee_id: String,
    pub role: Role,
}

impl TestUser {
    pub fn principal(&self) -> UserAuthenticationData {
        UserAuthenticationData {
            id: self.id,
            name: self.name.clone(),
            employee_id: self.employee_id.clone(),
            role: self.role,
            approved: true,
        }
    }

    pub fn token(&self) -> String {
        AuthKeys::from_secret(TEST_SECRET)
            .issue(self.id, self.role, 3600)
            .expect("token")
    }

    pub fn bearer(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token()))
    }
}

/// Inserts an approved user.
pub fn seed_user(db: &Database, name: &str, employee_id: &str, role: Role) -> TestUser {
    let id = db
        .with_conn(|conn| User::new(name.into(), employee_id.into(), role, true).save(conn))
        .expect("seed user");
    TestUser {
        id,
        name: name.to_string(),
        employee_id: employee_id.to_string(),
        role,
    }
}

pub fn observation_request() -> ObservationRequest {
    ObservationRequest {
        date: "2024-05-06".into(),
        time: Some("09:30".into()),
        area: "Yard".into(),
        observation_type: "Unsafe Condition".into(),
        observation_class: ObservationClass::Negative,
        activity_type: "Lifting".into(),
        description: "Sling shows broken wires".into(),
        direct_cause: None,
        root_cause: None,
        immediate_action: Some("Sling quarantined".into()),
        corrective_action: Some("Replace slings and inspect stock".into()),
        corrective_action_assigned_to: None,
        corrective_action_due_date: None,
        risk_level: RiskLevel::Medium,
        evidence: Vec::new(),
    }
}

/// The production app wiring over the given database.
pub fn test_app(
    db: &Database,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(db.clone()))
        .app_data(web::Data::new(AuthKeys::from_secret(TEST_SECRET)))
        .wrap(UserAuthenticationMiddlewareFactory)
        .configure(routes::configure)
}
