//! HTTP surface: metrics and health endpoints

pub mod routes;

pub use routes::build_router;
