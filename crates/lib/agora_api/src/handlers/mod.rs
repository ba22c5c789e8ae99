//! Request handlers.

pub mod auth;
pub mod management;
pub mod roles;
pub mod users;
