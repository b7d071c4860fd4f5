//! Business logic services and third-party clients.

pub mod audit_service;
pub mod cal_com_client;
pub mod calendly_client;
pub mod chat_service;
pub mod scoping_service;
pub mod slack_service;
pub mod taskflow_service;
