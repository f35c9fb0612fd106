use clap::Parser;
use std::io::IsTerminal;
use taskbridge::cli::{Cli, Commands};
use taskbridge::cli_handlers::{
    handle_org_command, handle_outbox_command, handle_project_command, handle_reconcile_command,
    handle_resolve_command, handle_user_command,
};
use taskbridge::config::BridgeConfig;
use taskbridge::error::{BridgeError, Result};
use taskbridge::logging::{
    cleanup_old_logs, init_logging, log_dir, log_file_path, ApplicationMode, LoggingConfig,
};
use taskbridge::routing::{RequestContext, TaskStoreResolver};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };

    let is_server = matches!(cli.command, Commands::Serve { .. });

    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose, cli.json);
    if is_server {
        log_config = LoggingConfig::for_mode(ApplicationMode::Server);
        // Detached servers log to a rotated file
        if !std::io::stdout().is_terminal() {
            log_config.file_output = Some(log_file_path(&config.data_dir, ApplicationMode::Server));
        }
    }
    let log_config = log_config.with_env_overrides();

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if is_server {
        let retention_days = std::env::var("TASKBRIDGE_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);
        if let Err(e) = cleanup_old_logs(&log_dir(&config.data_dir), retention_days) {
            tracing::warn!(error = %e, "Log cleanup failed");
        }
    }

    if let Err(e) = run(cli, config).await {
        exit_with(e);
    }
}

fn exit_with(e: BridgeError) -> ! {
    let error_response = e.to_error_response();
    match serde_json::to_string_pretty(&error_response) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}", e),
    }
    std::process::exit(1);
}

/// Environment first, then CLI flags.
fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.host = host.clone();
        }
        if let Some(port) = port {
            config.port = *port;
        }
    }
    Ok(config)
}

async fn run(cli: Cli, config: BridgeConfig) -> Result<()> {
    if let Commands::Serve { .. } = cli.command {
        return taskbridge::server::run(config)
            .await
            .map_err(BridgeError::OtherError);
    }

    let resolver = TaskStoreResolver::connect(config).await?;

    let result = match cli.command {
        Commands::Serve { .. } => Ok(()),
        Commands::Org(cmd) => handle_org_command(&resolver, cmd).await,
        Commands::User(cmd) => handle_user_command(&resolver, cmd).await,
        Commands::Project(cmd) => handle_project_command(&resolver, cmd).await,
        Commands::Resolve {
            organization,
            user,
            project,
            format,
        } => {
            let ctx = RequestContext {
                organization_id: organization,
                user_id: user,
                project_id: project,
            };
            handle_resolve_command(&resolver, ctx, &format).await
        },
        Commands::Outbox(cmd) => handle_outbox_command(&resolver, cmd).await,
        Commands::Reconcile {
            repair,
            prune,
            format,
        } => handle_reconcile_command(&resolver, repair, prune, &format).await,
    };

    resolver.registry().close_all().await;
    resolver.meta().close().await;
    result
}
