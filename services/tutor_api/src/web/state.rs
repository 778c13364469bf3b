//! services/tutor_api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::adapters::NotificationQueue;
use crate::config::Config;
use chain_tutor_core::domain::CredentialSlot;
use chain_tutor_core::ports::{ClientFactory, CredentialStore, PortResult};
use chain_tutor_core::{AiContext, AlertFeed, Assistant, Notification, NotificationSink};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// How long the startup notice about an unusable system key stays on screen.
const SYSTEM_KEY_NOTICE_MS: u64 = 7000;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Lock order is `ai` before `assistant` or `alerts`. No lock is held while a
/// provider call is in flight.
pub struct AppState {
    pub config: Arc<Config>,
    pub ai: RwLock<AiContext>,
    pub assistant: Mutex<Assistant>,
    pub alerts: Mutex<AlertFeed>,
    pub credential_store: Arc<dyn CredentialStore>,
    pub notifications: Arc<NotificationQueue>,
}

impl AppState {
    /// Builds the clients, restores any persisted user credential and seeds the conversation.
    pub async fn new(
        config: Arc<Config>,
        factory: Arc<dyn ClientFactory>,
        credential_store: Arc<dyn CredentialStore>,
        notifications: Arc<NotificationQueue>,
    ) -> PortResult<Self> {
        let mut ai = AiContext::new(factory, config.system_api_key.as_deref());
        let restored = ai.restore_user_credential(credential_store.as_ref()).await?;
        if restored {
            info!("Restored the stored user credential.");
        }

        let mut assistant = Assistant::new(
            config.chat_model.clone(),
            config.max_attachment_mb,
            config.rate_limit_cooldown,
        );
        assistant.open(&ai);

        let mut alerts = AlertFeed::new(config.alerts_model.clone(), config.rate_limit_cooldown);
        let system = ai.status(CredentialSlot::System);
        if !system.is_ready() {
            alerts.on_client_changed(CredentialSlot::System, system);
            let message = alerts
                .view(CredentialSlot::System, Instant::now())
                .status_message;
            warn!("System alerts unavailable: {}", message);
            notifications.notify(Notification::error(message).with_duration(SYSTEM_KEY_NOTICE_MS));
        }
        if restored {
            alerts.on_client_changed(CredentialSlot::User, ai.status(CredentialSlot::User));
        }

        Ok(Self {
            config,
            ai: RwLock::new(ai),
            assistant: Mutex::new(assistant),
            alerts: Mutex::new(alerts),
            credential_store,
            notifications,
        })
    }
}
