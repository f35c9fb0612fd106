use super::utils::{emit, print_route, print_stats};
use crate::cli::OutboxCommands;
use crate::error::Result;
use crate::outbox::{OutboxDispatcher, OutboxManager};
use crate::reconcile::{Finding, Reconciler};
use crate::routing::{RequestContext, RouteDescription, TaskStoreResolver};
use serde_json::json;

pub async fn handle_outbox_command(resolver: &TaskStoreResolver, cmd: OutboxCommands) -> Result<()> {
    let outbox = OutboxManager::new(resolver.meta());

    match cmd {
        OutboxCommands::Flush { limit, format } => {
            let dispatcher =
                OutboxDispatcher::new(resolver.clone(), resolver.config().outbox.clone());
            let summary = dispatcher.process_pending(limit).await?;
            let stats = outbox.stats().await?;
            let result = json!({ "summary": summary, "stats": stats });
            emit(&format, &result, |_| {
                println!(
                    "Processed {}: {} delivered, {} retrying, {} failed",
                    summary.processed, summary.delivered, summary.retrying, summary.failed
                );
                print_stats(&stats);
            })
        },
        OutboxCommands::Status {
            status,
            limit,
            format,
        } => {
            let stats = outbox.stats().await?;
            let entries = outbox.list(status.as_deref(), limit).await?;
            let result = json!({ "stats": stats, "entries": entries });
            emit(&format, &result, |_| {
                print_stats(&stats);
                for e in &entries {
                    println!(
                        "#{} {} {} [{}] attempts={}{}",
                        e.id,
                        e.kind,
                        e.aggregate_id,
                        e.status,
                        e.attempts,
                        e.last_error
                            .as_deref()
                            .map(|err| format!(" error={}", err))
                            .unwrap_or_default()
                    );
                }
            })
        },
        OutboxCommands::Retry { format } => {
            let moved = outbox.retry_failed().await?;
            emit(&format, &json!({ "requeued": moved }), |_| {
                println!("Requeued {} failed entr{}", moved, if moved == 1 { "y" } else { "ies" });
            })
        },
    }
}

pub async fn handle_resolve_command(
    resolver: &TaskStoreResolver,
    ctx: RequestContext,
    format: &str,
) -> Result<()> {
    let route = resolver.resolve_task_store(&ctx).await?;
    emit(format, &RouteDescription::from(&route), print_route)
}

pub async fn handle_reconcile_command(
    resolver: &TaskStoreResolver,
    repair: bool,
    prune: bool,
    format: &str,
) -> Result<()> {
    let reconciler = Reconciler::new(resolver.clone());
    let report = reconciler.scan().await?;
    let summary = if repair {
        Some(reconciler.repair(&report, prune).await?)
    } else {
        None
    };

    let result = json!({ "report": report, "repair": summary });
    emit(format, &result, |_| {
        println!(
            "Scanned {} project(s) across {} store(s)",
            report.scanned_projects,
            report.scanned_stores.len()
        );
        for u in &report.unreachable {
            println!("  unreachable {}: {}", u.target, u.reason);
        }
        for finding in &report.findings {
            match finding {
                Finding::MissingMirror { meta_id } => println!("  missing mirror   {}", meta_id),
                Finding::DanglingLink { meta_id, store_id } => {
                    println!("  dangling link    {} -> {}", meta_id, store_id)
                },
                Finding::OrphanMirror {
                    target,
                    store_id,
                    meta_project_id,
                } => println!(
                    "  orphan mirror    {} in {} (for {})",
                    store_id, target, meta_project_id
                ),
                Finding::Unlinked { meta_id, store_id } => {
                    println!("  unlinked         {} -> {}", meta_id, store_id)
                },
            }
        }
        if report.is_clean() {
            println!("All consistent");
        }
        if let Some(s) = &summary {
            println!(
                "Repaired: {} requeued, {} relinked, {} pruned, {} skipped",
                s.requeued, s.relinked, s.pruned, s.skipped
            );
        }
    })
}
