//! RevOps site backend - library
//!
//! Public marketing site API (catalog, scoping, quotes, contact, chat,
//! booking) plus the admin CRM and the TaskFlow kanban.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
