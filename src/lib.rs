//! # relay-elector
//!
//! Bully leader election for a cross-chain relayer fleet: picks one
//! coordinator peer per signing session over a peer-to-peer messaging
//! substrate and keeps watching it for liveness.
//!
//! ```text
//! ┌────────────┐  coordinator(ctx, peers)  ┌──────────────────────┐
//! │ relayer     │ ────────────────────────▶ │ BullyElector          │
//! │ (TSS, fees) │ ◀──────────────────────── │  driver + event loop  │
//! └────────────┘        PeerId             └──────────┬───────────┘
//!                                                      │ Messaging port
//!                                          ┌───────────▼───────────┐
//!                                          │ session-scoped P2P     │
//!                                          │ (injected by the host) │
//!                                          └───────────────────────┘
//! ```
//!
//! The transport is injected behind the [`Messaging`] port; the crate
//! ships an in-process [`MemoryHub`] implementation used by the tests
//! and by single-process deployments. All election state lives in one
//! event loop per `(session, host)` pair and dies with its cancellation
//! token; nothing is persisted.

// Public crate surface is organized by layer: `domain`, `infrastructure`, `application`, `foundation`.
pub mod application;
pub mod domain;
pub mod foundation;
pub mod infrastructure;

pub use application::{BullyElector, ElectorStatus};
pub use tokio_util::sync::CancellationToken;
pub use domain::{rank_peers, Phase, SessionOrdering};
pub use foundation::{ElectorError, PeerId, Result, SessionId};
pub use infrastructure::config::ElectorConfig;
pub use infrastructure::transport::memory::{MemoryHub, MemoryMessaging};
pub use infrastructure::transport::{ElectionMessage, MessageEnvelope, Messaging, MessagingSubscription};
