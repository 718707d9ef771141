//! Request handlers.

pub mod admin;
pub mod admin_link;
pub mod auth;
pub mod discord;
pub mod sso;
