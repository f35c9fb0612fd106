use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use super::server::AppState;

/// Create API router with all endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        // Metadata
        .route(
            "/organizations",
            get(handlers::list_organizations).post(handlers::create_organization),
        )
        .route("/organizations/:id", get(handlers::get_organization))
        .route("/users", post(handlers::create_user))
        .route("/users/:id", get(handlers::get_user))
        // Projects, addressed by either ID
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/:id",
            get(handlers::get_project)
                .patch(handlers::update_project)
                .delete(handlers::delete_project),
        )
        .route(
            "/projects/:id/columns",
            get(handlers::list_columns).post(handlers::create_column),
        )
        // Tasks
        .route("/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route(
            "/tasks/:id",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route(
            "/tasks/:id/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
        .route("/resolve", get(handlers::resolve))
        // Admin
        .route("/admin/outbox", get(handlers::list_outbox))
        .route("/admin/outbox/flush", post(handlers::flush_outbox))
        .route("/admin/reconcile", post(handlers::reconcile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_routes_creation() {
        let _router = api_routes();
    }
}
