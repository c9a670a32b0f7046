//! Course marketplace server: catalog, cart and checkout, enrollment,
//! progress tracking and ratings, backed by SQLite and served over
//! session-authenticated JSON endpoints.

pub mod api;
pub mod cart;
pub mod config;
pub mod course;
pub mod enrollment;
pub mod error;
pub mod ids;
pub mod principal;
pub mod progress;
pub mod rating;
pub mod store;
pub mod user;
pub mod utils;

pub use error::{Error, Result};

use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
}
