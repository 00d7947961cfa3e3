//! Command implementations.

pub mod auth;
pub mod ooo;
