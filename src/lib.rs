//! Sessionward - session and rate limit primitives for web services
//!
//! This library provides:
//! - a database-backed session store with sliding expiry and a hard ceiling
//! - long-lived API tokens
//! - an in-memory request rate limiter
//! - axum middleware wiring all three into a router

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
