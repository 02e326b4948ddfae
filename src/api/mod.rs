//! HTTP API implementation.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use server::run_server;
pub use state::ApiState;
