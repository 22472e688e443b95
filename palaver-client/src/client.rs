//! The client: request plumbing and the sync polling loop.
//!
//! A [`Client`] owns the transport, the storage, the crypto orchestrator,
//! the preprocessor registry and the event bus. The sync loop is a single
//! spawned task; its lifecycle is driven by the pure state machine in
//! `palaver-core` and stopping is cooperative (the in-flight long poll is
//! allowed to complete).

use crate::authz::{self, AuthzError};
use crate::bus::EventBus;
use crate::crypto::{CryptoEngine, CryptoError, EncryptionOrchestrator};
use crate::preprocessor::{Preprocessor, PreprocessorRegistry};
use crate::projector::RoomStateProjector;
use crate::state_reader::{StateReadError, StateReader};
use crate::storage::{Storage, StorageError};
use crate::transport::{HttpTransport, Method, TransportError};
use crate::upgrades::{self, RoomUpgradeHistory};
use async_trait::async_trait;
use palaver_core::{
    backoff_delay, filter_decision, FilterDecision, LifecycleAction, LifecycleEvent,
    PowerLevelBounds, SyncLifecycle,
};
use palaver_types::{
    event_type, CachedFilter, FilterDefinition, IdentifierError, PowerLevelAction, RawEvent,
    RoomAlias, RoomId, SyncResponse,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const API_PREFIX: &str = "/_matrix/client/v3";
const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Client operation errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport failed or the server rejected the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A crypto operation failed or no engine is configured.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An authorization query failed.
    #[error(transparent)]
    Authorization(#[from] AuthzError),

    /// A state read failed.
    #[error(transparent)]
    StateRead(#[from] StateReadError),

    /// A malformed room/user/event identifier was supplied.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// A space helper was pointed at a room that is not a space.
    #[error("room {0} is not a space")]
    NotASpace(String),

    /// The server response did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

/// A room whose create event marks it as a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    /// The space's room id.
    pub room_id: String,
}

struct ClientInner<T, S> {
    transport: T,
    storage: S,
    crypto: EncryptionOrchestrator,
    bus: EventBus,
    preprocessors: tokio::sync::RwLock<PreprocessorRegistry>,
    projector: tokio::sync::Mutex<Option<RoomStateProjector>>,
    lifecycle: std::sync::Mutex<SyncLifecycle>,
    user_id: std::sync::Mutex<Option<String>>,
    presence: std::sync::Mutex<Option<String>>,
}

/// A sync engine client over a transport and a storage backend.
pub struct Client<T, S> {
    inner: Arc<ClientInner<T, S>>,
}

impl<T, S> Clone for Client<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> std::fmt::Debug for Client<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("lifecycle", &*self.inner.lifecycle.lock().unwrap())
            .finish()
    }
}

fn api(path: &str) -> String {
    format!("{API_PREFIX}{path}")
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

fn string_field(value: &Value, field: &str) -> Result<String, ClientError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::UnexpectedResponse(format!("missing field {field}")))
}

fn default_filter() -> FilterDefinition {
    json!({"room": {"timeline": {"limit": 20}}})
}

impl<T, S> Client<T, S>
where
    T: HttpTransport + 'static,
    S: Storage + 'static,
{
    /// Create a client with no crypto engine.
    pub fn new(transport: T, storage: S) -> Self {
        Self::with_crypto_engine(transport, storage, None)
    }

    /// Create a client with an optional crypto engine.
    pub fn with_crypto_engine(
        transport: T,
        storage: S,
        engine: Option<Arc<dyn CryptoEngine>>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                storage,
                crypto: EncryptionOrchestrator::new(engine),
                bus: EventBus::default(),
                preprocessors: tokio::sync::RwLock::new(PreprocessorRegistry::new()),
                projector: tokio::sync::Mutex::new(None),
                lifecycle: std::sync::Mutex::new(SyncLifecycle::new()),
                user_id: std::sync::Mutex::new(None),
                presence: std::sync::Mutex::new(None),
            }),
        }
    }

    /// The signal bus for subscribing to sync output.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Register a preprocessor. Takes effect from the next sync cycle.
    pub async fn add_preprocessor(&self, preprocessor: Arc<dyn Preprocessor>) {
        self.inner.preprocessors.write().await.add(preprocessor);
    }

    /// Set the presence value sent with sync requests; `None` omits it.
    /// Read fresh at every loop iteration.
    pub fn set_presence(&self, presence: Option<String>) {
        *self.inner.presence.lock().unwrap() = presence;
    }

    /// The current sync loop lifecycle state.
    pub fn sync_state(&self) -> SyncLifecycle {
        *self.inner.lifecycle.lock().unwrap()
    }

    /// Resolve and cache the own user id.
    pub async fn whoami(&self) -> Result<String, ClientError> {
        if let Some(user_id) = self.inner.user_id.lock().unwrap().clone() {
            return Ok(user_id);
        }
        let response = self
            .inner
            .transport
            .request(Method::Get, &api("/account/whoami"), &[], None)
            .await?;
        let user_id = string_field(&response, "user_id")?;
        *self.inner.user_id.lock().unwrap() = Some(user_id.clone());
        Ok(user_id)
    }

    async fn resolve_filter(
        &self,
        user_id: &str,
        desired: FilterDefinition,
    ) -> Result<String, ClientError> {
        let cached = self.inner.storage.get_filter().await?;
        match filter_decision(cached.as_ref(), &desired) {
            FilterDecision::Reuse(id) => Ok(id),
            FilterDecision::Create => {
                let path = api(&format!("/user/{}/filter", encode_segment(user_id)));
                let response = self
                    .inner
                    .transport
                    .request(Method::Post, &path, &[], Some(desired.clone()))
                    .await?;
                let id = string_field(&response, "filter_id")?;
                self.inner
                    .storage
                    .set_filter(CachedFilter {
                        id: id.clone(),
                        definition: desired,
                    })
                    .await?;
                Ok(id)
            }
        }
    }

    /// Start the sync loop.
    ///
    /// Resolves the own user id and the sync filter up front (failures
    /// surface here), then spawns the single polling task. A no-op when the
    /// loop is already running or winding down.
    pub async fn start_sync(&self, filter: Option<FilterDefinition>) -> Result<(), ClientError> {
        if self.inner.lifecycle.lock().unwrap().is_active() {
            return Ok(());
        }
        let user_id = self.whoami().await?;
        let filter_id = self
            .resolve_filter(&user_id, filter.unwrap_or_else(default_filter))
            .await?;

        let begin = {
            let mut lifecycle = self.inner.lifecycle.lock().unwrap();
            let (next, actions) = lifecycle.on_event(LifecycleEvent::StartRequested);
            *lifecycle = next;
            actions.contains(&LifecycleAction::BeginPolling)
        };
        if begin {
            tracing::info!(user_id, filter_id, "starting sync loop");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(sync_loop(inner, user_id, filter_id));
        }
        Ok(())
    }

    /// Request a cooperative stop of the sync loop.
    ///
    /// The in-flight long poll completes; only the next iteration is
    /// suppressed. Calling this repeatedly, or before `start_sync`, is a
    /// no-op.
    pub fn stop_sync(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        let (next, _) = lifecycle.on_event(LifecycleEvent::StopRequested);
        *lifecycle = next;
    }

    /// Send a room event, encrypting it first when the room is encrypted.
    /// Returns the new event id.
    pub async fn send_room_event(
        &self,
        room_id: &str,
        kind: &str,
        content: Value,
    ) -> Result<String, ClientError> {
        let (kind, content) = match self
            .inner
            .crypto
            .encrypt_if_needed(room_id, kind, &content)
            .await?
        {
            Some(encrypted) => (event_type::ENCRYPTED.to_string(), encrypted),
            None => (kind.to_string(), content),
        };
        let txn_id = uuid::Uuid::new_v4().to_string();
        let path = api(&format!(
            "/rooms/{}/send/{}/{}",
            encode_segment(room_id),
            encode_segment(&kind),
            txn_id
        ));
        let response = self
            .inner
            .transport
            .request(Method::Put, &path, &[], Some(content))
            .await?;
        string_field(&response, "event_id")
    }

    /// Send an `m.room.message` event. Returns the new event id.
    pub async fn send_message(&self, room_id: &str, content: Value) -> Result<String, ClientError> {
        self.send_room_event(room_id, event_type::MESSAGE, content)
            .await
    }

    /// Send a state event. State events are never encrypted.
    pub async fn send_state_event(
        &self,
        room_id: &str,
        kind: &str,
        state_key: &str,
        content: Value,
    ) -> Result<String, ClientError> {
        let path = api(&format!(
            "/rooms/{}/state/{}/{}",
            encode_segment(room_id),
            encode_segment(kind),
            encode_segment(state_key)
        ));
        let response = self
            .inner
            .transport
            .request(Method::Put, &path, &[], Some(content))
            .await?;
        string_field(&response, "event_id")
    }

    /// Join a room by id or alias. Returns the resolved room id.
    pub async fn join_room(&self, room_ref: &str) -> Result<String, ClientError> {
        if room_ref.starts_with('#') {
            RoomAlias::parse(room_ref)?;
        } else {
            RoomId::parse(room_ref)?;
        }
        let path = api(&format!("/join/{}", encode_segment(room_ref)));
        let response = self
            .inner
            .transport
            .request(Method::Post, &path, &[], Some(json!({})))
            .await?;
        string_field(&response, "room_id")
    }

    /// Leave a room.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), ClientError> {
        RoomId::parse(room_id)?;
        let path = api(&format!("/rooms/{}/leave", encode_segment(room_id)));
        self.inner
            .transport
            .request(Method::Post, &path, &[], Some(json!({})))
            .await?;
        Ok(())
    }

    /// Fetch a single event, decrypted when the room is encrypted.
    pub async fn get_event(&self, room_id: &str, event_id: &str) -> Result<RawEvent, ClientError> {
        let raw = self.get_raw_event(room_id, event_id).await?;
        Ok(self
            .inner
            .crypto
            .maybe_decrypt(&raw, room_id)
            .await
            .unwrap_or(raw))
    }

    /// Fetch a single event exactly as the server stores it. Never
    /// triggers decryption.
    pub async fn get_raw_event(
        &self,
        room_id: &str,
        event_id: &str,
    ) -> Result<RawEvent, ClientError> {
        let path = api(&format!(
            "/rooms/{}/event/{}",
            encode_segment(room_id),
            encode_segment(event_id)
        ));
        let response = self
            .inner
            .transport
            .request(Method::Get, &path, &[], None)
            .await?;
        serde_json::from_value(response)
            .map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }

    /// Whether `user_id` may send events of the given type in the room.
    pub async fn user_has_power_level_for(
        &self,
        user_id: &str,
        room_id: &str,
        kind: &str,
        is_state: bool,
    ) -> Result<bool, ClientError> {
        Ok(authz::user_has_power_level_for(self, user_id, room_id, kind, is_state).await?)
    }

    /// Whether `user_id` may perform a named action in the room.
    pub async fn user_has_power_level_for_action(
        &self,
        user_id: &str,
        room_id: &str,
        action: PowerLevelAction,
    ) -> Result<bool, ClientError> {
        Ok(authz::user_has_power_level_for_action(self, user_id, room_id, action).await?)
    }

    /// The legal bounds for the own user changing `target_id`'s power level.
    pub async fn power_level_change_bounds(
        &self,
        target_id: &str,
        room_id: &str,
    ) -> Result<PowerLevelBounds, ClientError> {
        let own = self.whoami().await?;
        Ok(authz::power_level_change_bounds(self, &own, target_id, room_id).await?)
    }

    /// The upgrade history around a room.
    pub async fn upgrade_history(
        &self,
        room_id: &str,
    ) -> Result<RoomUpgradeHistory, ClientError> {
        Ok(upgrades::upgrade_history(self, room_id).await?)
    }

    /// Resolve a room as a space. Fails with [`ClientError::NotASpace`]
    /// when its create event does not carry the space room type.
    pub async fn get_space(&self, room_id: &str) -> Result<Space, ClientError> {
        let create = self
            .get_room_state_event(room_id, event_type::CREATE, "")
            .await?;
        let is_space = create
            .as_ref()
            .and_then(|e| e.content.get("type"))
            .and_then(Value::as_str)
            == Some(event_type::SPACE);
        if is_space {
            Ok(Space {
                room_id: room_id.to_string(),
            })
        } else {
            Err(ClientError::NotASpace(room_id.to_string()))
        }
    }

    /// Upload one-time keys to the server. Requires a crypto engine.
    pub async fn upload_one_time_keys(
        &self,
        one_time_keys: Value,
    ) -> Result<BTreeMap<String, u64>, ClientError> {
        self.inner.crypto.engine()?;
        let response = self
            .inner
            .transport
            .request(
                Method::Post,
                &api("/keys/upload"),
                &[],
                Some(json!({"one_time_keys": one_time_keys})),
            )
            .await?;
        parse_key_counts(&response)
    }

    /// Query the server-side one-time key counts. Requires a crypto engine.
    pub async fn get_one_time_key_counts(&self) -> Result<BTreeMap<String, u64>, ClientError> {
        self.inner.crypto.engine()?;
        let response = self
            .inner
            .transport
            .request(Method::Post, &api("/keys/upload"), &[], Some(json!({})))
            .await?;
        parse_key_counts(&response)
    }

    /// Claim one-time keys for the given device map. Requires a crypto
    /// engine.
    pub async fn claim_one_time_keys(&self, one_time_keys: Value) -> Result<Value, ClientError> {
        self.inner.crypto.engine()?;
        let response = self
            .inner
            .transport
            .request(
                Method::Post,
                &api("/keys/claim"),
                &[],
                Some(json!({"one_time_keys": one_time_keys})),
            )
            .await?;
        Ok(response)
    }

    /// List the own user's devices. Requires a crypto engine.
    pub async fn get_own_devices(&self) -> Result<Vec<Value>, ClientError> {
        self.inner.crypto.engine()?;
        let response = self
            .inner
            .transport
            .request(Method::Get, &api("/devices"), &[], None)
            .await?;
        match response.get("devices") {
            Some(Value::Array(devices)) => Ok(devices.clone()),
            _ => Err(ClientError::UnexpectedResponse(
                "missing field devices".into(),
            )),
        }
    }
}

fn parse_key_counts(response: &Value) -> Result<BTreeMap<String, u64>, ClientError> {
    let counts = response
        .get("one_time_key_counts")
        .cloned()
        .ok_or_else(|| ClientError::UnexpectedResponse("missing field one_time_key_counts".into()))?;
    serde_json::from_value(counts).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
}

#[async_trait]
impl<T, S> StateReader for Client<T, S>
where
    T: HttpTransport + 'static,
    S: Storage + 'static,
{
    async fn get_room_state_event(
        &self,
        room_id: &str,
        kind: &str,
        state_key: &str,
    ) -> Result<Option<RawEvent>, StateReadError> {
        let path = api(&format!("/rooms/{}/state", encode_segment(room_id)));
        let response = match self
            .inner
            .transport
            .request(Method::Get, &path, &[], None)
            .await
        {
            Ok(value) => value,
            // Unknown/unreadable room reads as "no state events".
            Err(TransportError::Api { .. }) => return Ok(None),
            Err(e) => return Err(StateReadError::Read(e.to_string())),
        };
        let events: Vec<RawEvent> =
            serde_json::from_value(response).map_err(|e| StateReadError::Read(e.to_string()))?;
        Ok(events
            .into_iter()
            .find(|e| e.event_type == kind && e.state_key.as_deref() == Some(state_key)))
    }
}

enum SyncCycleError {
    Fatal(TransportError),
    Transient {
        error: ClientError,
        retry_after_ms: Option<u64>,
    },
}

fn transient(error: impl Into<ClientError>) -> SyncCycleError {
    SyncCycleError::Transient {
        error: error.into(),
        retry_after_ms: None,
    }
}

async fn sync_loop<T, S>(inner: Arc<ClientInner<T, S>>, user_id: String, filter_id: String)
where
    T: HttpTransport + 'static,
    S: Storage + 'static,
{
    let mut attempt: u32 = 0;
    loop {
        if !inner.lifecycle.lock().unwrap().should_poll() {
            break;
        }
        match sync_once(&inner, &user_id, &filter_id).await {
            Ok(()) => attempt = 0,
            Err(SyncCycleError::Fatal(error)) => {
                tracing::error!(error = %error, "sync failed fatally, stopping");
                break;
            }
            Err(SyncCycleError::Transient {
                error,
                retry_after_ms,
            }) => {
                let delay = retry_after_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| backoff_delay(attempt));
                attempt = attempt.saturating_add(1);
                tracing::warn!(
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "sync failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    tracing::info!("sync loop exited");
    let mut lifecycle = inner.lifecycle.lock().unwrap();
    let (next, _) = lifecycle.on_event(LifecycleEvent::LoopExited);
    *lifecycle = next;
}

async fn sync_once<T, S>(
    inner: &Arc<ClientInner<T, S>>,
    user_id: &str,
    filter_id: &str,
) -> Result<(), SyncCycleError>
where
    T: HttpTransport + 'static,
    S: Storage + 'static,
{
    let since = inner.storage.get_sync_token().await.map_err(transient)?;

    let mut query = vec![
        ("timeout".to_string(), SYNC_TIMEOUT_MS.to_string()),
        ("filter".to_string(), filter_id.to_string()),
    ];
    if let Some(since) = since {
        query.push(("since".to_string(), since));
    }
    if let Some(presence) = inner.presence.lock().unwrap().clone() {
        query.push(("presence".to_string(), presence));
    }

    let response = match inner
        .transport
        .request(Method::Get, &api("/sync"), &query, None)
        .await
    {
        Ok(value) => value,
        Err(e) if e.is_fatal() => return Err(SyncCycleError::Fatal(e)),
        Err(e) => {
            let retry_after_ms = e.retry_after_ms();
            return Err(SyncCycleError::Transient {
                error: e.into(),
                retry_after_ms,
            });
        }
    };
    let response: SyncResponse = serde_json::from_value(response)
        .map_err(|e| transient(ClientError::UnexpectedResponse(e.to_string())))?;

    // Cursor persistence happens-before the next request is issued.
    inner
        .storage
        .set_sync_token(response.next_batch.clone())
        .await
        .map_err(transient)?;

    if let Err(e) = inner.crypto.update_from_sync(&response).await {
        tracing::warn!(error = %e, "crypto engine rejected sync key material");
    }

    let registry = inner.preprocessors.read().await;
    let mut projector = inner.projector.lock().await;
    let projector = projector.get_or_insert_with(|| RoomStateProjector::new(user_id.to_string()));
    projector
        .process(&response, &registry, &inner.crypto, &inner.bus)
        .await;
    Ok(())
}
