//! Public client facade.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::auth::Identity;
use crate::error::{require, ClientError, ErrorNormalizer};
use crate::events::{self, EventBus, EventPayload, Listener};
use crate::model::ResponseEnvelope;
use crate::options::ClientConfig;
use crate::transport::{Query, Transport};
use crate::upload::{ProgressFn, UploadForm};

/// Client for the platform API.
///
/// Owns its configuration, bearer identity and event bus; nothing is shared
/// between instances. Clones share all three. Once [`Client::close`] is
/// called every request fails with `CLIENT_CLOSED` and no further events are
/// emitted, including `error`; build a new client to continue.
///
/// # Example
/// ```no_run
/// use modelhub::{Client, ClientConfig, Environment};
///
/// # async fn run() -> Result<(), modelhub::ClientError> {
/// let client = Client::new(ClientConfig::new("mh_live_key", Environment::Production))?;
/// let models: modelhub::ResponseEnvelope = client.get("/models", &[("limit", "10")]).await?;
/// println!("{:?}", models.data);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    identity: Identity,
    bus: EventBus,
    errors: ErrorNormalizer,
    transport: Transport,
}

impl Client {
    /// Validate `config` and build the client. No request is made.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let identity = Identity::new(config.credential.clone());
        let bus = EventBus::new();
        let errors = ErrorNormalizer::new(bus.clone());
        let transport = Transport::new(config.clone(), identity.clone(), errors.clone())?;
        tracing::debug!(
            environment = %config.environment,
            base_url = transport.base_url(),
            "client created"
        );

        Ok(Self {
            config,
            identity,
            bus,
            errors,
            transport,
        })
    }

    /// Build from `MODELHUB_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// A copy of the configuration; changing it does not affect the client.
    pub fn config(&self) -> ClientConfig {
        self.config.clone()
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    // --- identity ---

    /// Use `token` as the bearer value for subsequent requests.
    pub fn set_identity(&self, token: &str) -> Result<(), ClientError> {
        let token = require("session token", token).map_err(|e| self.errors.raise(e))?;
        self.identity.set(token);
        tracing::debug!("session identity set");
        self.bus
            .emit(events::IDENTITY_CHANGED, EventPayload::Data(json!({"session": true})));
        Ok(())
    }

    /// Go back to the configured credential.
    pub fn clear_identity(&self) {
        self.identity.clear();
        tracing::debug!("session identity cleared");
        self.bus
            .emit(events::IDENTITY_CHANGED, EventPayload::Data(json!({"session": false})));
    }

    pub fn has_session(&self) -> bool {
        self.identity.is_session()
    }

    // --- events ---

    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.bus.on(event, listener);
    }

    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        self.bus.off(event, listener)
    }

    /// Emit `event` to its listeners. Ignored once the client is closed.
    pub fn emit(&self, event: &str, payload: EventPayload) -> usize {
        if self.is_closed() {
            tracing::debug!(event, "emit on closed client ignored");
            return 0;
        }
        self.bus.emit(event, payload)
    }

    /// Enter the terminal closed state, clear every listener and notify the
    /// `disconnected` listeners. Closing twice is a no-op.
    pub fn close(&self) {
        if self.errors.close() {
            return;
        }
        self.bus.close();
        tracing::debug!("client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.errors.is_closed()
    }

    // --- requests ---

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        self.ensure_open()?;
        self.transport.get(path, query).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<ResponseEnvelope<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.ensure_open()?;
        self.transport.post(path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<ResponseEnvelope<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.ensure_open()?;
        self.transport.put(path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        self.ensure_open()?;
        self.transport.delete(path, query).await
    }

    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: UploadForm,
        on_progress: Option<ProgressFn>,
    ) -> Result<ResponseEnvelope<T>, ClientError> {
        self.ensure_open()?;
        self.transport.upload(path, form, on_progress).await
    }

    /// Streamed POST; see [`Transport::stream`].
    pub async fn stream<B, T, F>(&self, path: &str, body: &B, on_frame: F) -> Result<usize, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
        F: FnMut(T),
    {
        self.ensure_open()?;
        self.transport.stream(path, body, on_frame).await
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            Err(self.errors.raise(ClientError::closed()))
        } else {
            Ok(())
        }
    }
}
