pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod sanitize;
pub mod store;
pub mod validation;

pub use config::Config;
pub use db::DbPool;
pub use routes::{create_router, AppState};
