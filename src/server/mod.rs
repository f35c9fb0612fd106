pub mod handlers;
pub mod models;
pub mod routes;
#[allow(clippy::module_inception)]
pub mod server;

pub use server::{create_router, run, AppState};
