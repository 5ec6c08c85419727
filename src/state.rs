//! Composition Root
//!
//! Wires configuration, stores, the event bus, transports, and the
//! orchestrator into one explicitly-passed object. Nothing here is a
//! process global; tests construct a [`CommandCenter`] with an injected
//! [`CommandApi`] and notifier.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::config::CoreConfig;
use crate::models::notification::UiNotifier;
use crate::services::bus::EventBus;
use crate::services::http::{CommandApi, HttpCommandApi};
use crate::services::identity::IdentityProvider;
use crate::services::message_store::MessageStore;
use crate::services::orchestrator::{Orchestrator, QUEUE_CAPACITY};
use crate::services::socket::SocketTransport;
use crate::services::task_store::TaskStore;
use crate::utils::error::{CoreError, CoreResult};

/// The store surface exposed to UI views
#[derive(Clone)]
pub struct Stores {
    pub tasks: Arc<TaskStore>,
    pub messages: Arc<MessageStore>,
}

/// The assembled client core
pub struct CommandCenter {
    config: CoreConfig,
    stores: Stores,
    bus: Arc<EventBus>,
    orchestrator: Arc<Orchestrator>,
    socket: Arc<SocketTransport>,
}

impl CommandCenter {
    /// Assemble the core with the production HTTP client
    pub fn new(config: CoreConfig, notifier: Arc<dyn UiNotifier>) -> CoreResult<Self> {
        let api: Arc<dyn CommandApi> = Arc::new(HttpCommandApi::new(
            &config.http_base_url,
            config.http_discovery_timeout_ms,
        )?);
        Self::with_api(config, api, notifier)
    }

    /// Assemble the core with an injected API implementation
    pub fn with_api(
        config: CoreConfig,
        api: Arc<dyn CommandApi>,
        notifier: Arc<dyn UiNotifier>,
    ) -> CoreResult<Self> {
        config.validate().map_err(CoreError::validation)?;

        let (events_tx, events_rx) = mpsc::channel(QUEUE_CAPACITY);

        let tasks = Arc::new(TaskStore::new());
        let messages = Arc::new(MessageStore::new(
            config.message_retention_count,
            config.message_max_age_days,
        ));
        let bus = Arc::new(EventBus::new());
        let socket = Arc::new(SocketTransport::new(
            config.socket_base_url.clone(),
            config.reconnect_base_delay_ms,
            config.reconnect_max_attempts,
            events_tx.clone(),
        ));
        let identity = Arc::new(IdentityProvider::new(
            Arc::clone(&api),
            config.allow_guest_identity,
        ));

        let orchestrator = Orchestrator::start(
            Arc::clone(&tasks),
            Arc::clone(&messages),
            Arc::clone(&bus),
            Arc::clone(&socket),
            api,
            identity,
            notifier,
            events_tx,
            events_rx,
        );

        Ok(Self {
            config,
            stores: Stores { tasks, messages },
            bus,
            orchestrator,
            socket,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn socket(&self) -> &Arc<SocketTransport> {
        &self.socket
    }

    /// Shut the core down: event loop, streams, and socket. Idempotent.
    pub async fn dispose(&self) {
        self.orchestrator.dispose().await;
    }
}
