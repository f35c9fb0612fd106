//! Output helpers shared by the CLI handlers.

use crate::db::models::{OutboxStats, Project};
use crate::error::{BridgeError, Result};
use crate::routing::RouteDescription;
use serde::Serialize;

/// `--format` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(BridgeError::InvalidInput(format!(
                "Unknown format '{}' (expected text or json)",
                other
            ))),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print `value` as JSON, or run `text` for the human form.
pub fn emit<T: Serialize>(format: &str, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match OutputFormat::parse(format)? {
        OutputFormat::Json => print_json(value),
        OutputFormat::Text => {
            text(value);
            Ok(())
        },
    }
}

pub fn print_project(project: &Project) {
    println!("Project {}: {}", project.id, project.name);
    if let Some(description) = &project.description {
        println!("  {}", description);
    }
    println!(
        "  organization: {}",
        project.organization_id.as_deref().unwrap_or("-")
    );
    println!("  owner:        {}", project.owner_id);
    match &project.custom_db_project_id {
        Some(store_id) => println!("  store id:     {}", store_id),
        None => println!("  store id:     (mirror pending)"),
    }
}

pub fn print_route(route: &RouteDescription) {
    println!("target:     {}", route.target);
    if route.degraded {
        println!("served by:  {} (degraded)", route.served_by);
    } else {
        println!("served by:  {}", route.served_by);
    }
    println!("collection: {}", route.collection.as_str());
    if let Some(project) = &route.project {
        println!(
            "project:    {} -> {}",
            project.meta_id,
            project.store_id.as_deref().unwrap_or("(mirror pending)")
        );
    }
}

pub fn print_stats(stats: &OutboxStats) {
    println!(
        "pending: {}  done: {}  failed: {}",
        stats.pending, stats.done, stats.failed
    );
}
