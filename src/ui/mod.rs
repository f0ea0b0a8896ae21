//! Web UI module

pub mod handlers;
pub mod server;
pub mod stream;

pub use server::{create_router, AppState, WebServer};
