//! HTTP API: configuration, service lifetime, routing and request mapping.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
