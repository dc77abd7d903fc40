//! HTTP gateway: router, handlers, and the server lifecycle.

mod handler;
mod server;

pub use handler::{AppState, create_router};
pub use server::Server;
