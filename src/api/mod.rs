//! API Module
//!
//! HTTP handlers and routing for the cache service REST API.
//!
//! # Endpoints
//! - `PUT /set` - Write a value through
//! - `GET /get/:key` - Read through the cache
//! - `DELETE /del/:key` - Delete and tombstone
//! - `GET /stats` - Cache counters
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
