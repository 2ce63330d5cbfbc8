//! REST API Route Handlers

pub mod clients;
pub mod health;
