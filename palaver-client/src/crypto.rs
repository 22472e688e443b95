//! Encryption orchestration.
//!
//! Palaver does not implement cryptography. An external engine owns
//! sessions, ratchets and key material behind the [`CryptoEngine`] trait;
//! this module only decides *when* to call it: which rooms encrypt, which
//! incoming events decrypt, and what sync-derived key material is forwarded
//! each cycle.

use async_trait::async_trait;
use palaver_types::{event_type, RawEvent, SyncResponse};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Crypto orchestration errors.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// A crypto operation was attempted without a configured engine.
    #[error("no crypto engine is configured")]
    NotEnabled,

    /// The engine reported a failure.
    #[error("crypto engine failure: {0}")]
    Engine(String),
}

/// The external cryptography engine collaborator.
#[async_trait]
pub trait CryptoEngine: Send + Sync {
    /// Whether the room is end-to-end encrypted.
    async fn is_room_encrypted(&self, room_id: &str) -> Result<bool, CryptoError>;

    /// Encrypt outgoing room event content, returning `m.room.encrypted`
    /// content.
    async fn encrypt_room_event(
        &self,
        room_id: &str,
        kind: &str,
        content: &Value,
    ) -> Result<Value, CryptoError>;

    /// Decrypt an incoming `m.room.encrypted` event.
    async fn decrypt_room_event(
        &self,
        event: &RawEvent,
        room_id: &str,
    ) -> Result<RawEvent, CryptoError>;

    /// Feed one sync cycle's key material to the engine: to-device events,
    /// one-time key counts, unused fallback key types and device list
    /// deltas, in that structural shape.
    async fn update_sync_data(
        &self,
        to_device_events: &[RawEvent],
        otk_counts: &BTreeMap<String, u64>,
        unused_fallback_key_types: Option<&[String]>,
        device_list_changed: &[String],
        device_list_left: &[String],
    ) -> Result<(), CryptoError>;
}

/// Decision layer between the sync engine and the crypto engine.
///
/// Holds an optional engine. Operations that require cryptography fail
/// fast with [`CryptoError::NotEnabled`] when no engine is configured;
/// passive paths (projection of encrypted rooms) degrade to passing events
/// through undecrypted.
#[derive(Clone, Default)]
pub struct EncryptionOrchestrator {
    engine: Option<Arc<dyn CryptoEngine>>,
}

impl EncryptionOrchestrator {
    /// Create an orchestrator with an optional engine.
    pub fn new(engine: Option<Arc<dyn CryptoEngine>>) -> Self {
        Self { engine }
    }

    /// Whether a crypto engine is configured.
    pub fn is_enabled(&self) -> bool {
        self.engine.is_some()
    }

    /// The engine, or [`CryptoError::NotEnabled`].
    pub fn engine(&self) -> Result<&Arc<dyn CryptoEngine>, CryptoError> {
        self.engine.as_ref().ok_or(CryptoError::NotEnabled)
    }

    /// Whether the room is encrypted. Without an engine every room is
    /// treated as unencrypted.
    pub async fn is_room_encrypted(&self, room_id: &str) -> Result<bool, CryptoError> {
        match &self.engine {
            Some(engine) => engine.is_room_encrypted(room_id).await,
            None => Ok(false),
        }
    }

    /// Encrypt outgoing content when the room requires it.
    ///
    /// Returns `Some(encrypted_content)` for encrypted rooms, `None` when
    /// the event should be sent as-is (unencrypted room, or no engine).
    pub async fn encrypt_if_needed(
        &self,
        room_id: &str,
        kind: &str,
        content: &Value,
    ) -> Result<Option<Value>, CryptoError> {
        let Some(engine) = &self.engine else {
            return Ok(None);
        };
        if !engine.is_room_encrypted(room_id).await? {
            return Ok(None);
        }
        engine
            .encrypt_room_event(room_id, kind, content)
            .await
            .map(Some)
    }

    /// Decrypt an incoming event when possible.
    ///
    /// Returns the decrypted event for `m.room.encrypted` events in
    /// encrypted rooms; `None` when the event is not encrypted, no engine
    /// is configured, or decryption fails (the failure is logged and the
    /// caller keeps the encrypted form).
    pub async fn maybe_decrypt(&self, event: &RawEvent, room_id: &str) -> Option<RawEvent> {
        let engine = self.engine.as_ref()?;
        if event.event_type != event_type::ENCRYPTED {
            return None;
        }
        match engine.is_room_encrypted(room_id).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "encryption lookup failed");
                return None;
            }
        }
        match engine.decrypt_room_event(event, room_id).await {
            Ok(decrypted) => Some(decrypted),
            Err(e) => {
                tracing::warn!(room_id, error = %e, "failed to decrypt event");
                None
            }
        }
    }

    /// Forward one sync cycle's key material to the engine. Called exactly
    /// once per cycle; a no-op without an engine.
    pub async fn update_from_sync(&self, response: &SyncResponse) -> Result<(), CryptoError> {
        let Some(engine) = &self.engine else {
            return Ok(());
        };
        engine
            .update_sync_data(
                &response.to_device.events,
                &response.device_one_time_keys_count,
                response.device_unused_fallback_key_types.as_deref(),
                &response.device_lists.changed,
                &response.device_lists.left,
            )
            .await
    }
}

impl std::fmt::Debug for EncryptionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionOrchestrator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Scripted crypto engine for tests.
///
/// Rooms listed as encrypted have their `m.room.encrypted` events
/// "decrypted" by replacing the event type and content with the plaintext
/// carried in the ciphertext's `plaintext` field.
#[derive(Debug, Default)]
pub struct MockCryptoEngine {
    inner: std::sync::Mutex<MockCryptoInner>,
}

#[derive(Debug, Default)]
struct MockCryptoInner {
    encrypted_rooms: std::collections::BTreeSet<String>,
    sync_updates: Vec<MockSyncUpdate>,
}

/// One recorded `update_sync_data` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSyncUpdate {
    /// The forwarded to-device events.
    pub to_device_events: Vec<RawEvent>,
    /// The forwarded one-time key counts.
    pub otk_counts: BTreeMap<String, u64>,
    /// The forwarded unused fallback key types.
    pub unused_fallback_key_types: Option<Vec<String>>,
    /// The forwarded changed-device users.
    pub device_list_changed: Vec<String>,
    /// The forwarded left-device users.
    pub device_list_left: Vec<String>,
}

impl MockCryptoEngine {
    /// Create a mock engine with no encrypted rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a room as encrypted.
    pub fn set_room_encrypted(&self, room_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .encrypted_rooms
            .insert(room_id.to_string());
    }

    /// All recorded sync updates.
    pub fn sync_updates(&self) -> Vec<MockSyncUpdate> {
        self.inner.lock().unwrap().sync_updates.clone()
    }
}

#[async_trait]
impl CryptoEngine for MockCryptoEngine {
    async fn is_room_encrypted(&self, room_id: &str) -> Result<bool, CryptoError> {
        Ok(self.inner.lock().unwrap().encrypted_rooms.contains(room_id))
    }

    async fn encrypt_room_event(
        &self,
        _room_id: &str,
        kind: &str,
        content: &Value,
    ) -> Result<Value, CryptoError> {
        Ok(serde_json::json!({
            "algorithm": "m.megolm.v1.aes-sha2",
            "ciphertext": {"plaintext": content, "original_type": kind}
        }))
    }

    async fn decrypt_room_event(
        &self,
        event: &RawEvent,
        _room_id: &str,
    ) -> Result<RawEvent, CryptoError> {
        let ciphertext = event
            .content
            .get("ciphertext")
            .ok_or_else(|| CryptoError::Engine("no ciphertext".into()))?;
        let plaintext = ciphertext
            .get("plaintext")
            .cloned()
            .ok_or_else(|| CryptoError::Engine("undecryptable".into()))?;
        let original_type = ciphertext
            .get("original_type")
            .and_then(Value::as_str)
            .unwrap_or(event_type::MESSAGE);

        let mut decrypted = event.clone();
        decrypted.event_type = original_type.to_string();
        decrypted.content = match plaintext {
            Value::Object(map) => map,
            other => {
                return Err(CryptoError::Engine(format!(
                    "plaintext is not an object: {other}"
                )))
            }
        };
        Ok(decrypted)
    }

    async fn update_sync_data(
        &self,
        to_device_events: &[RawEvent],
        otk_counts: &BTreeMap<String, u64>,
        unused_fallback_key_types: Option<&[String]>,
        device_list_changed: &[String],
        device_list_left: &[String],
    ) -> Result<(), CryptoError> {
        self.inner.lock().unwrap().sync_updates.push(MockSyncUpdate {
            to_device_events: to_device_events.to_vec(),
            otk_counts: otk_counts.clone(),
            unused_fallback_key_types: unused_fallback_key_types.map(<[String]>::to_vec),
            device_list_changed: device_list_changed.to_vec(),
            device_list_left: device_list_left.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encrypted_event(plaintext: Value) -> RawEvent {
        serde_json::from_value(json!({
            "sender": "@a:x.org",
            "type": "m.room.encrypted",
            "event_id": "$enc",
            "content": {
                "algorithm": "m.megolm.v1.aes-sha2",
                "ciphertext": {"plaintext": plaintext, "original_type": "m.room.message"}
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn no_engine_reports_rooms_unencrypted() {
        let orchestrator = EncryptionOrchestrator::new(None);
        assert!(!orchestrator.is_enabled());
        assert!(!orchestrator.is_room_encrypted("!a:x.org").await.unwrap());
    }

    #[tokio::test]
    async fn no_engine_fails_fast_on_engine_access() {
        let orchestrator = EncryptionOrchestrator::new(None);
        assert!(matches!(
            orchestrator.engine(),
            Err(CryptoError::NotEnabled)
        ));
    }

    #[tokio::test]
    async fn encrypt_if_needed_skips_unencrypted_rooms() {
        let engine = Arc::new(MockCryptoEngine::new());
        let orchestrator = EncryptionOrchestrator::new(Some(engine));
        let result = orchestrator
            .encrypt_if_needed("!plain:x.org", "m.room.message", &json!({"body": "hi"}))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn encrypt_if_needed_encrypts_for_encrypted_rooms() {
        let engine = Arc::new(MockCryptoEngine::new());
        engine.set_room_encrypted("!secret:x.org");
        let orchestrator = EncryptionOrchestrator::new(Some(engine));

        let encrypted = orchestrator
            .encrypt_if_needed("!secret:x.org", "m.room.message", &json!({"body": "hi"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(encrypted["algorithm"], "m.megolm.v1.aes-sha2");
    }

    #[tokio::test]
    async fn maybe_decrypt_round_trips_mock_payload() {
        let engine = Arc::new(MockCryptoEngine::new());
        engine.set_room_encrypted("!secret:x.org");
        let orchestrator = EncryptionOrchestrator::new(Some(engine));

        let event = encrypted_event(json!({"msgtype": "m.text", "body": "secret"}));
        let decrypted = orchestrator
            .maybe_decrypt(&event, "!secret:x.org")
            .await
            .unwrap();
        assert_eq!(decrypted.event_type, "m.room.message");
        assert_eq!(decrypted.content.get("body"), Some(&json!("secret")));
    }

    #[tokio::test]
    async fn maybe_decrypt_ignores_plaintext_events() {
        let engine = Arc::new(MockCryptoEngine::new());
        engine.set_room_encrypted("!secret:x.org");
        let orchestrator = EncryptionOrchestrator::new(Some(engine));

        let plain: RawEvent = serde_json::from_value(json!({
            "sender": "@a:x.org",
            "type": "m.room.message",
            "content": {"body": "hi"}
        }))
        .unwrap();
        assert!(orchestrator.maybe_decrypt(&plain, "!secret:x.org").await.is_none());
    }

    #[tokio::test]
    async fn maybe_decrypt_without_engine_passes_through() {
        let orchestrator = EncryptionOrchestrator::new(None);
        let event = encrypted_event(json!({"body": "hi"}));
        assert!(orchestrator.maybe_decrypt(&event, "!a:x.org").await.is_none());
    }

    #[tokio::test]
    async fn update_from_sync_forwards_all_sections() {
        let engine = Arc::new(MockCryptoEngine::new());
        let orchestrator = EncryptionOrchestrator::new(Some(Arc::clone(&engine) as _));

        let response: SyncResponse = serde_json::from_value(json!({
            "next_batch": "s1",
            "to_device": {"events": [{
                "sender": "@b:x.org",
                "type": "m.room_key",
                "content": {}
            }]},
            "device_one_time_keys_count": {"signed_curve25519": 10},
            "device_unused_fallback_key_types": ["signed_curve25519"],
            "device_lists": {"changed": ["@b:x.org"], "left": ["@c:x.org"]}
        }))
        .unwrap();

        orchestrator.update_from_sync(&response).await.unwrap();

        let updates = engine.sync_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].to_device_events.len(), 1);
        assert_eq!(updates[0].otk_counts.get("signed_curve25519"), Some(&10));
        assert_eq!(
            updates[0].unused_fallback_key_types.as_deref(),
            Some(["signed_curve25519".to_string()].as_slice())
        );
        assert_eq!(updates[0].device_list_changed, vec!["@b:x.org"]);
        assert_eq!(updates[0].device_list_left, vec!["@c:x.org"]);
    }

    #[tokio::test]
    async fn update_from_sync_without_engine_is_noop() {
        let orchestrator = EncryptionOrchestrator::new(None);
        let response: SyncResponse =
            serde_json::from_value(json!({"next_batch": "s1"})).unwrap();
        orchestrator.update_from_sync(&response).await.unwrap();
    }
}
