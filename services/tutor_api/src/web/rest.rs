//! services/tutor_api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Provider calls follow a begin/run/complete split: the handler locks the
//! component long enough to start the request, releases it for the network
//! call, then locks again to apply the result. Run and complete happen in a
//! spawned task, so a client that disconnects mid-call still leaves the
//! component idle.

use crate::web::protocol::{
    AlertView, AlertsResponse, AttachmentView, ClientStateView, ConversationResponse,
    CredentialStatusResponse, FetchSlotView, LearningPathView, MessageView, NotificationView,
    RenderRequest, RenderResponse, SaveCredentialRequest, SendMessageRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use chain_tutor_core::assistant::ASSISTANT_SLOT;
use chain_tutor_core::domain::{CredentialSlot, SourceFile};
use chain_tutor_core::{
    markdown, AttachmentError, ChatError, FetchError, IngestError, SlotReport, LEARNING_PATHS,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_messages_handler,
        send_message_handler,
        learning_paths_handler,
        stage_attachment_handler,
        clear_attachment_handler,
        list_alerts_handler,
        refresh_alerts_handler,
        credential_status_handler,
        save_user_credential_handler,
        clear_user_credential_handler,
        drain_notifications_handler,
        render_handler,
    ),
    components(
        schemas(
            SendMessageRequest, SaveCredentialRequest, RenderRequest, MessageView,
            AttachmentView, ConversationResponse, LearningPathView, AlertView,
            FetchSlotView, AlertsResponse, ClientStateView, CredentialStatusResponse,
            NotificationView, RenderResponse
        )
    ),
    tags(
        (name = "Chain Tutor API", description = "AI assistant, scam alerts and credentials for the blockchain learning app.")
    )
)]
pub struct ApiDoc;

type Rejection = (StatusCode, String);

fn chat_rejection(e: ChatError) -> Rejection {
    match e {
        ChatError::EmptyPrompt => (StatusCode::BAD_REQUEST, e.to_string()),
        ChatError::Busy => (StatusCode::CONFLICT, e.to_string()),
        ChatError::NotReady(inner) => (
            StatusCode::SERVICE_UNAVAILABLE,
            inner.user_message(ASSISTANT_SLOT),
        ),
    }
}

fn fetch_rejection(slot: CredentialSlot, e: FetchError) -> Rejection {
    match e {
        FetchError::Busy => (StatusCode::CONFLICT, e.to_string()),
        FetchError::NotReady(inner) => (StatusCode::SERVICE_UNAVAILABLE, inner.user_message(slot)),
    }
}

fn attachment_rejection(e: AttachmentError) -> Rejection {
    let status = match e {
        AttachmentError::AlreadyStaged => StatusCode::CONFLICT,
        AttachmentError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AttachmentError::UnsupportedMimeType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
    };
    (status, e.user_message())
}

//=========================================================================================
// Assistant Handlers
//=========================================================================================

/// Returns the conversation, the staged attachment and the cooldown state.
#[utoipa::path(
    get,
    path = "/assistant/messages",
    responses((status = 200, description = "The current conversation", body = ConversationResponse))
)]
pub async fn list_messages_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let assistant = app_state.assistant.lock().await;
    Json(ConversationResponse {
        messages: assistant.messages().iter().map(MessageView::from).collect(),
        busy: assistant.is_busy(),
        staged_attachment: assistant.staged_attachment().map(AttachmentView::from),
        cooldown_remaining_secs: assistant
            .cooldown_remaining(Instant::now())
            .map(|d| d.as_secs().max(1)),
    })
}

/// Sends a prompt (and any staged attachment) and waits for the reply.
///
/// A failed provider call still answers 200: the returned message carries the
/// error in its body and `error_detail`.
#[utoipa::path(
    post,
    path = "/assistant/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "The resolved assistant message", body = MessageView),
        (status = 400, description = "Empty prompt and no attachment"),
        (status = 409, description = "A reply is already pending"),
        (status = 503, description = "The assistant has no usable client")
    )
)]
pub async fn send_message_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let notifier = app_state.notifications.as_ref();

    let turn = {
        let ai = app_state.ai.read().await;
        let mut assistant = app_state.assistant.lock().await;
        assistant
            .begin_turn(&ai, &payload.text, notifier)
            .map_err(chat_rejection)?
    };

    // The turn resolves in its own task so a dropped request cannot leave it pending.
    let message_id = turn.message_id;
    let task_state = app_state.clone();
    let completion = tokio::spawn(async move {
        let result = turn.run().await;
        let mut assistant = task_state.assistant.lock().await;
        assistant
            .complete_turn(
                turn.message_id,
                result,
                Instant::now(),
                task_state.notifications.as_ref(),
            )
            .map(MessageView::from)
    });

    let message = completion
        .await
        .map_err(|e| {
            error!(%message_id, "Assistant turn task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Assistant turn failed".to_string(),
            )
        })?
        .ok_or_else(|| {
            error!(%message_id, "Pending message vanished before completion.");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Pending message was already resolved".to_string(),
            )
        })?;
    Ok(Json(message))
}

/// Lists the suggested prompts.
#[utoipa::path(
    get,
    path = "/assistant/learning-paths",
    responses((status = 200, description = "Suggested prompts", body = [LearningPathView]))
)]
pub async fn learning_paths_handler() -> impl IntoResponse {
    Json(
        LEARNING_PATHS
            .iter()
            .map(LearningPathView::from)
            .collect::<Vec<_>>(),
    )
}

/// Stages a file for the next prompt.
///
/// Accepts a multipart/form-data request with a single file part.
#[utoipa::path(
    post,
    path = "/assistant/attachment",
    request_body(content_type = "multipart/form-data", description = "The file to attach."),
    responses(
        (status = 201, description = "Attachment staged", body = AttachmentView),
        (status = 400, description = "Missing file part"),
        (status = 409, description = "An attachment is already staged"),
        (status = 413, description = "File exceeds the size limit"),
        (status = 415, description = "Unsupported file type")
    )
)]
pub async fn stage_attachment_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let name = field.file_name().unwrap_or("untitled").to_string();
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data: Bytes = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;

    let file = SourceFile {
        name,
        mime_type,
        data,
    };
    let mut assistant = app_state.assistant.lock().await;
    let staged = assistant
        .stage_attachment(&file, app_state.notifications.as_ref())
        .map_err(attachment_rejection)?;
    Ok((StatusCode::CREATED, Json(AttachmentView::from(staged))))
}

/// Discards the staged attachment, if any.
#[utoipa::path(
    delete,
    path = "/assistant/attachment",
    responses((status = 204, description = "No attachment is staged any more"))
)]
pub async fn clear_attachment_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    app_state.assistant.lock().await.clear_attachment();
    StatusCode::NO_CONTENT
}

//=========================================================================================
// Alert Handlers
//=========================================================================================

async fn alerts_snapshot(app_state: &AppState) -> AlertsResponse {
    let feed = app_state.alerts.lock().await;
    let now = Instant::now();
    AlertsResponse {
        alerts: feed.alerts().iter().map(AlertView::from).collect(),
        system: feed.view(CredentialSlot::System, now).into(),
        user: feed.view(CredentialSlot::User, now).into(),
    }
}

/// Returns the current alert list and both fetch slots.
#[utoipa::path(
    get,
    path = "/alerts",
    responses((status = 200, description = "Alerts and slot status", body = AlertsResponse))
)]
pub async fn list_alerts_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(alerts_snapshot(&app_state).await)
}

/// Fetches a fresh alert list with the given credential slot.
///
/// Provider failures are reported through the slot status, not the HTTP status.
#[utoipa::path(
    post,
    path = "/alerts/{slot}/refresh",
    params(("slot" = String, Path, description = "`system` or `user`")),
    responses(
        (status = 200, description = "Alerts and slot status after the fetch", body = AlertsResponse),
        (status = 409, description = "A fetch is already running for this slot"),
        (status = 503, description = "The slot has no usable client")
    )
)]
pub async fn refresh_alerts_handler(
    State(app_state): State<Arc<AppState>>,
    Path(slot): Path<CredentialSlot>,
) -> Result<impl IntoResponse, Rejection> {
    let notifier = app_state.notifications.as_ref();

    let ticket = {
        let ai = app_state.ai.read().await;
        let mut feed = app_state.alerts.lock().await;
        feed.begin_fetch(&ai, slot, notifier)
            .map_err(|e| fetch_rejection(slot, e))?
    };

    // Like assistant turns, the fetch completes even if the request is dropped.
    let task_state = app_state.clone();
    tokio::spawn(async move {
        let result = ticket.run().await;
        let ai = task_state.ai.read().await;
        if !ai.is_current(&ticket.handle) {
            warn!(%slot, "Credential changed while the fetch was running.");
        }
        let mut feed = task_state.alerts.lock().await;
        feed.complete_fetch(slot, result, Instant::now(), task_state.notifications.as_ref());
    })
    .await
    .map_err(|e| {
        error!(%slot, "Alert fetch task failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Alert fetch failed".to_string(),
        )
    })?;

    Ok(Json(alerts_snapshot(&app_state).await))
}

//=========================================================================================
// Credential Handlers
//=========================================================================================

/// Reports whether each client slot is usable.
#[utoipa::path(
    get,
    path = "/credentials",
    responses((status = 200, description = "Client status per slot", body = CredentialStatusResponse))
)]
pub async fn credential_status_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let ai = app_state.ai.read().await;
    Json(CredentialStatusResponse {
        system: SlotReport::from(ai.status(CredentialSlot::System)).into(),
        user: SlotReport::from(ai.status(CredentialSlot::User)).into(),
    })
}

/// Stores the learner's own API key and builds a client from it.
#[utoipa::path(
    put,
    path = "/credentials/user",
    request_body = SaveCredentialRequest,
    responses(
        (status = 200, description = "The user client is ready", body = ClientStateView),
        (status = 400, description = "Blank credential"),
        (status = 422, description = "A client could not be built from the credential")
    )
)]
pub async fn save_user_credential_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SaveCredentialRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let mut ai = app_state.ai.write().await;
    let outcome = ai
        .save_user_credential(
            &payload.credential,
            app_state.credential_store.as_ref(),
            app_state.notifications.as_ref(),
        )
        .await;

    {
        let mut feed = app_state.alerts.lock().await;
        match &outcome {
            Ok(_) | Err(IngestError::ClientInitialization(_)) => {
                feed.on_client_changed(CredentialSlot::User, ai.status(CredentialSlot::User))
            }
            Err(IngestError::CredentialMissing) => feed.on_blank_user_credential(),
            Err(_) => {}
        }
    }

    match outcome {
        Ok(_) => Ok(Json(ClientStateView::from(SlotReport::Ready))),
        Err(e @ IngestError::CredentialMissing) => {
            Err((StatusCode::BAD_REQUEST, e.user_message(CredentialSlot::User)))
        }
        Err(e @ IngestError::ClientInitialization(_)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            e.user_message(CredentialSlot::User),
        )),
        Err(e) => {
            error!("Failed to save the user credential: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Forgets the learner's API key.
#[utoipa::path(
    delete,
    path = "/credentials/user",
    responses(
        (status = 204, description = "User credential removed"),
        (status = 500, description = "The credential store could not be cleared")
    )
)]
pub async fn clear_user_credential_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let mut ai = app_state.ai.write().await;
    ai.clear_user_credential(
        app_state.credential_store.as_ref(),
        app_state.notifications.as_ref(),
    )
    .await
    .map_err(|e| {
        error!("Failed to clear the user credential: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    app_state
        .alerts
        .lock()
        .await
        .on_client_changed(CredentialSlot::User, ai.status(CredentialSlot::User));
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Misc Handlers
//=========================================================================================

/// Takes every notification queued since the last call.
#[utoipa::path(
    get,
    path = "/notifications",
    responses((status = 200, description = "Pending notifications, oldest first", body = [NotificationView]))
)]
pub async fn drain_notifications_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(
        app_state
            .notifications
            .drain()
            .into_iter()
            .map(NotificationView::from)
            .collect::<Vec<_>>(),
    )
}

/// Renders markdown-subset text to HTML.
#[utoipa::path(
    post,
    path = "/render",
    request_body = RenderRequest,
    responses((status = 200, description = "Rendered HTML and block descriptors", body = RenderResponse))
)]
pub async fn render_handler(Json(payload): Json<RenderRequest>) -> impl IntoResponse {
    let blocks = markdown::parse(&payload.text);
    Json(RenderResponse {
        html: markdown::to_html(&blocks),
        blocks,
    })
}
