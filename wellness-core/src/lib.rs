//! Wellness Core - Shared Types
//!
//! Pure data structures shared by every other crate: the client record and
//! its projections, the event envelope, the error taxonomy, configuration
//! and health types. No I/O happens here.

mod client;
mod config;
mod constants;
mod error;
mod event;
mod health;

pub use client::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use event::*;
pub use health::*;
