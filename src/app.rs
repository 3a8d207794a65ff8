use crate::actions::ActionDispatcher;
use crate::config::{Config, ENTRY_TITLE};
use crate::integrations::jotty::{ClientError, JottyClient};
use crate::runtime::{Coordinator, CoordinatorState, UpdateError};
use crate::views::{EntityEvent, EntityRegistry, SensorState, aggregate_sensors};
use std::io;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why setup did not complete. Every variant except `Registry` is
/// transient from the host's point of view and worth retrying later.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to build Jotty client: {0}")]
    Client(#[source] ClientError),
    #[error("Jotty is not reachable: {0}")]
    NotReady(#[source] ClientError),
    #[error("initial refresh failed: {0}")]
    FirstRefresh(#[source] UpdateError),
    #[error("failed to load entity registry: {0}")]
    Registry(#[source] io::Error),
}

impl SetupError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SetupError::NotReady(_) | SetupError::FirstRefresh(_))
    }
}

/// Credential check failures, in the terms the configuration step shows.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("cannot connect: {0}")]
    CannotConnect(#[source] ClientError),
    #[error("invalid authentication")]
    InvalidAuth,
}

/// Checks the URL with the health endpoint, then the key with the summary
/// endpoint. Returns the title to store the entry under.
pub async fn validate_config(config: &Config) -> Result<&'static str, ValidationError> {
    let client = JottyClient::new(&config.connection.url, &config.api_key(), config.timeouts)
        .map_err(ValidationError::CannotConnect)?;
    client
        .test_connection()
        .await
        .map_err(ValidationError::CannotConnect)?;
    match client.validate_api_key().await {
        Ok(()) => Ok(ENTRY_TITLE),
        Err(ClientError::InvalidApiKey) => Err(ValidationError::InvalidAuth),
        Err(err) => Err(ValidationError::CannotConnect(err)),
    }
}

/// One configured Jotty instance: the client, its coordinator, the
/// materialized entity views and the poll task. Dropped state never leaks
/// into another instance.
pub struct Integration {
    config: Config,
    client: Arc<JottyClient>,
    coordinator: Arc<Coordinator>,
    dispatcher: ActionDispatcher,
    registry: EntityRegistry,
    poll: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl Integration {
    pub async fn setup(config: Config) -> Result<Self, SetupError> {
        let client = Arc::new(
            JottyClient::new(&config.connection.url, &config.api_key(), config.timeouts)
                .map_err(SetupError::Client)?,
        );
        client.test_connection().await.map_err(SetupError::NotReady)?;

        let coordinator = Arc::new(Coordinator::new(
            client.clone(),
            &config.connection.marker_tag,
            config.polling.debounce(),
        ));
        coordinator
            .first_refresh()
            .await
            .map_err(SetupError::FirstRefresh)?;

        let registry =
            EntityRegistry::load(&config.entity_registry_path()).map_err(SetupError::Registry)?;
        debug!(tracked = registry.len(), "entity registry loaded");

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(Arc::clone(&coordinator).run(config.polling.interval(), stop_rx));
        info!(url = client.base_url(), marker = %config.connection.marker_tag, "Jotty integration ready");

        Ok(Self {
            dispatcher: ActionDispatcher::new(client.clone(), coordinator.clone()),
            config,
            client,
            coordinator,
            registry,
            poll: Some((stop_tx, handle)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &JottyClient {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.coordinator.subscribe()
    }

    pub fn sensors(&self) -> Vec<SensorState> {
        aggregate_sensors(&self.coordinator.current())
    }

    /// Renders every materialized entity view against the current state.
    pub fn entity_views(&self) -> Vec<SensorState> {
        let state = self.coordinator.current();
        let marker = self.coordinator.marker();
        self.registry
            .views()
            .map(|view| view.render(&state, marker))
            .collect()
    }

    /// Reconciles the entity registry with the latest snapshot.
    pub fn sync_entities(&mut self) -> Vec<EntityEvent> {
        let Some(snapshot) = self.coordinator.current().snapshot else {
            return Vec::new();
        };
        self.registry.sync(&snapshot)
    }

    /// Stops polling and waits for the loop to exit.
    pub async fn shutdown(mut self) {
        if let Some((stop_tx, handle)) = self.poll.take() {
            let _ = stop_tx.send(());
            if let Err(err) = handle.await {
                warn!(error = %err, "poll task ended abnormally");
            }
        }
        info!("Jotty integration unloaded");
    }
}
