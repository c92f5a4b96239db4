//! Terminal chat client for the HR assistant service.

pub mod auth;
pub mod client;
pub mod controller;
pub mod repl;
pub mod session;
pub mod settings;
