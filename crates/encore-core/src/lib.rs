//! encore-core - Core library for Encore
//!
//! This crate contains the request models, the remote gateway seam, and the
//! sync engine shared by every Encore interface: caching, retry, change
//! debouncing, optimistic updates, deduplication and ranking, and the
//! single-lock invariant.

pub mod cache;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod models;
pub mod optimistic;
pub mod ranking;
pub mod retry;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{BackendConfig, EngineConfig, Role, SessionIdentity};
pub use error::{ClassifiedError, Error, ErrorClass, Outcome, Result, StaleDataWarning};
pub use gateway::{MemoryBackend, RemoteGateway, SupabaseGateway};
pub use models::{NewRequest, QueueSettings, Request, RequestId, RequestRef, Song};
pub use ranking::AggregateRequest;
pub use state::ConnectionState;
pub use sync::{QueueSnapshot, SyncOrchestrator};
