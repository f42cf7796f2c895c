//! HTTP request handlers.

pub mod analytics;
pub mod auth;
pub mod feedback;
pub mod health;
pub mod permissions;
pub mod projects;
pub mod resources;
pub mod roles;
pub mod user;
pub mod users;
pub mod webhooks;
pub mod widget;
