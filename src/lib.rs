//! Storage core of a multi-tenant kanban backend.
//!
//! Project metadata lives in one metadata store; tasks live in task stores
//! selected per request by [`routing::TaskStoreResolver`]. Writes the task
//! store must follow travel through the [`outbox`], and [`reconcile`]
//! repairs whatever drifts anyway.

pub mod bridge;
pub mod cli;
pub mod cli_handlers;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod logging;
pub mod organizations;
pub mod outbox;
pub mod projects;
pub mod reconcile;
pub mod resolver;
pub mod routing;
pub mod server;
pub mod store;
pub mod users;

#[cfg(test)]
pub mod test_utils;
