//! Service layer shared by handlers and middleware.

pub mod cookies;
pub mod pages;
pub mod session;
