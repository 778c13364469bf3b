pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;

pub use rest::ApiDoc;

// Multipart framing adds overhead on top of the file itself; oversized files
// must still reach the validator so the learner gets the proper notice.
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

/// Request body limit for a given attachment limit. Saturates instead of overflowing.
fn body_limit(max_attachment_mb: u64) -> usize {
    usize::try_from(max_attachment_mb)
        .unwrap_or(usize::MAX)
        .saturating_mul(1024 * 1024)
        .saturating_mul(2)
        .saturating_add(MULTIPART_SLACK_BYTES)
}

/// Builds the API routes over a shared state. CORS and Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    let limit = body_limit(app_state.config.max_attachment_mb);

    Router::new()
        .route(
            "/assistant/messages",
            get(rest::list_messages_handler).post(rest::send_message_handler),
        )
        .route("/assistant/learning-paths", get(rest::learning_paths_handler))
        .route(
            "/assistant/attachment",
            post(rest::stage_attachment_handler).delete(rest::clear_attachment_handler),
        )
        .route("/alerts", get(rest::list_alerts_handler))
        .route("/alerts/{slot}/refresh", post(rest::refresh_alerts_handler))
        .route("/credentials", get(rest::credential_status_handler))
        .route(
            "/credentials/user",
            put(rest::save_user_credential_handler).delete(rest::clear_user_credential_handler),
        )
        .route("/notifications", get(rest::drain_notifications_handler))
        .route("/render", post(rest::render_handler))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(app_state)
}
