#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod journal;
pub mod local_state;
pub mod queue;
pub mod sync_client;
pub mod transport;

pub use config::{SyncSettings, SyncSettingsError};
pub use error::{ClientError, JournalError, TransportError};
pub use journal::SyncJournal;
pub use local_state::{LocalSessionState, RewardEvent};
pub use queue::SyncQueue;
pub use sync_client::{FlushReason, FlushReport, SyncClient, SyncStatus};
pub use transport::{HttpTransport, InProcessTransport, SyncTransport};
