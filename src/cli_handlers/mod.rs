// CLI command handlers
//
// Metadata: org, user, project
// Routing and consistency: resolve, outbox, reconcile

pub mod metadata_commands;
pub mod outbox_commands;
pub mod utils;

pub use metadata_commands::{handle_org_command, handle_project_command, handle_user_command};
pub use outbox_commands::{
    handle_outbox_command, handle_reconcile_command, handle_resolve_command,
};
pub use utils::{emit, print_json, OutputFormat};
