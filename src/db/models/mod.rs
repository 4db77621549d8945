pub mod attachment;
pub mod audit_log;
pub mod notification;
pub mod request;
pub mod user;
