//! Database models (SQLx).

pub mod audit_log;
pub mod contact_submission;
pub mod conversation;
pub mod crm;
pub mod package;
pub mod quote;
pub mod scoping;
pub mod service;
pub mod taskflow;
