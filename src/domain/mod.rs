//! Domain layer: pure election logic with no IO. The event loop in
//! `application` drives these types; nothing here touches the transport.

pub mod ordering;
pub mod state;

pub use ordering::{rank_peers, SessionOrdering};
pub use state::{BullyState, Phase};
