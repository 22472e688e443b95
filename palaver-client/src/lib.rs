//! # palaver-client
//!
//! The I/O half of the Palaver chat client engine: the HTTP transport,
//! persistent storage seams, the long-poll sync loop, room-state
//! projection onto a typed event bus, power-level authorization, room
//! upgrade traversal and encryption orchestration.
//!
//! The pure decision logic (power arithmetic, membership selection, the
//! sync lifecycle state machine, filter reuse) lives in `palaver-core`;
//! this crate executes those decisions against real collaborators.
//!
//! ## Quick start
//!
//! ```no_run
//! use palaver_client::{Client, MemoryStorage, ReqwestTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new("https://chat.example.org", Some("TOKEN".into()));
//! let client = Client::new(transport, MemoryStorage::new());
//!
//! let mut messages = client.bus().subscribe_messages();
//! client.start_sync(None).await?;
//! while let Ok(message) = messages.recv().await {
//!     println!("{}: {:?}", message.room_id, message.event.content.get("body"));
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authz;
pub mod bus;
pub mod client;
pub mod crypto;
pub mod preprocessor;
pub mod projector;
pub mod state_reader;
pub mod storage;
pub mod transport;
pub mod upgrades;

pub use authz::AuthzError;
pub use bus::{
    AccountDataSignal, EventBus, RoomEventSignal, RoomInvite, RoomJoin, RoomLeave,
    DEFAULT_BUS_CAPACITY,
};
pub use client::{Client, ClientError, Space};
pub use crypto::{CryptoEngine, CryptoError, EncryptionOrchestrator, MockCryptoEngine};
pub use preprocessor::{EventKind, Preprocessor, PreprocessorRegistry};
pub use projector::RoomStateProjector;
pub use state_reader::{MemoryStateReader, StateReadError, StateReader};
pub use storage::{MemoryStorage, Storage, StorageError};
pub use transport::{
    HttpTransport, Method, MockTransport, RecordedRequest, ReqwestTransport, TransportError,
};
pub use upgrades::{upgrade_history, RoomUpgradeHistory, RoomUpgradeLink};
