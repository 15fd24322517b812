//! HTTP API Module
//!
//! REST surface over the read and write paths.

mod http;

pub use http::{AppState, HttpServer};
