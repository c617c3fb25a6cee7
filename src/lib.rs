//! Appointment-booking API: administrators publish time slots with finite
//! capacity, users reserve seats, and a monthly payment policy gates who
//! may book. One core, two interchangeable storage adapters.

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};

pub mod auth;
pub mod booking;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod state;
pub mod store;
pub mod timeutil;

use crate::config::{Backend, Config};
use crate::errors::ApiError;
use crate::state::AppState;
use crate::store::{BookingStore, MemStore, PgStore};

pub async fn run() -> std::io::Result<()> {
    let config = Config::from_env();
    errors::set_debug(config.debug_errors);

    let store: Arc<dyn BookingStore> = match config.backend {
        Backend::Postgres => {
            let url = config
                .database_url
                .clone()
                .expect("DATABASE_URL must be set");
            let pool = db::connect(&url)
                .await
                .expect("failed to connect to Postgres");
            db::init_schema(&pool)
                .await
                .expect("schema initialization failed");
            info!("connected to Postgres, schema ready");
            Arc::new(PgStore::new(pool))
        }
        Backend::Memory => {
            warn!("using the in-memory store; data will not survive a restart");
            Arc::new(MemStore::new())
        }
    };

    let state = web::Data::new(AppState::new(store, config.clone()));
    info!("listening on 0.0.0.0:{}", config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // Malformed bodies, queries and path segments all answer with
            // the API's own {"error": ...} shape.
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await
}
