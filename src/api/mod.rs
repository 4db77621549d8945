pub mod attachment;
pub mod auth;
pub mod health;
pub mod notification;
pub mod request;
pub mod user;
