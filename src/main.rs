use actix_cors::Cors;
use actix_web::{middleware, rt, web, App, HttpServer};
use clap::Parser;
use std::{io, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use config::{Cli, Command, Config};
use database::Database;
use models::{
    dropdown::DropdownOption,
    user::{AuthKeys, User, UserAuthenticationMiddlewareFactory},
};

mod config;
mod database;
mod error;
mod models;
mod routes;
#[cfg(test)]
mod test_support;

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("tracing init failed: {e}");
    }

    let cli = Cli::parse();
    let db = Database::open(&cli.config.database).map_err(io::Error::other)?;
    let keys = AuthKeys::from_secret(&cli.config.jwt_secret);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config, db, keys).await,
        Command::IssueToken { user_id, ttl_secs } => {
            let user = db
                .with_conn(|conn| User::find_by_id(conn, user_id))
                .map_err(io::Error::other)?
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no user with id {user_id}"))
                })?;
            let token = keys
                .issue(user_id, user.role, ttl_secs)
                .map_err(io::Error::other)?;
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: Config, db: Database, keys: AuthKeys) -> io::Result<()> {
    spawn_reconciliation(db.clone(), Duration::from_secs(config.reconcile_delay_secs));

    let db = web::Data::new(db);
    let keys = web::Data::new(keys);
    let cors_origin = config.cors_origin.clone();

    info!(host = %config.host, port = config.port, "starting server");
    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .app_data(db.clone())
            .app_data(keys.clone())
            .wrap(UserAuthenticationMiddlewareFactory)
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

/// Backfills dropdown options once, shortly after startup.
fn spawn_reconciliation(db: Database, delay: Duration) {
    rt::spawn(async move {
        rt::time::sleep(delay).await;
        match db.run(|conn| DropdownOption::reconcile(conn)).await {
            Ok(0) => info!("dropdown options already up to date"),
            Ok(added) => info!(added, "dropdown options reconciled"),
            Err(e) => error!(error = %e, "dropdown reconciliation failed"),
        }
    });
}
