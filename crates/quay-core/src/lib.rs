//! Hub and dock runtime.
//!
//! A [`Hub`] is the naming service: it owns the authoritative map from slot
//! name to the dock address serving it. A [`Dock`] hosts local signalers
//! behind an acceptor, registers them with the hub, and invokes remote
//! slots over lazily dialed peer connections. Calls correlate by a
//! per-connection index; results come back through [`PendingTable`].

mod config;
mod dock;
mod error;
mod hub;
mod peer;
mod pending;
mod proxy;
mod signaler;

pub use config::*;
pub use dock::*;
pub use error::*;
pub use hub::*;
pub use pending::*;
pub use proxy::*;
pub use signaler::*;
