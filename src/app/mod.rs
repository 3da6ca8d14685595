// src/app/mod.rs

pub mod handlers;
pub mod routes;

pub use routes::app_routes;
