#![doc = include_str!("../README.md")]

// Re-export the layer crates for callers that want the full paths.
pub use quay_codec;
pub use quay_core;
pub use quay_wire;

// Codec types
pub use quay_codec::{DecodeError, NilKey, TypeMismatch, Value, ValueMap};

// Runtime types
pub use quay_core::{
    CallError,
    Config,
    DEFAULT_DOCK_PORT_BASE,
    DEFAULT_HEARTBEAT_INTERVAL,
    DispatchError,
    Dock,
    DockError,
    Hub,
    PendingTable,
    ProxyMaker,
    ProxyRegistry,
    Signaler,
    SlotDecl,
    SlotHandle,
};

// Wire types (for tooling and tests that speak frames directly)
pub use quay_wire::{MAX_FRAME_SIZE, Packet, WireError, WireStream};

/// Runs a hub bound at `addr` until it is closed from another task.
///
/// The handle form ([`Hub::bind`] + [`Hub::run`]) is the same thing with
/// a grip on [`Hub::close`].
pub async fn serve(addr: &str) -> std::io::Result<()> {
    Hub::bind(addr, Config::default()).await?.run().await
}

/// Brings up a dock against the hub at `hub_addr` with default tuning.
///
/// `slots` carries both hosted slots ([`SlotDecl::export`]) and declared
/// imports ([`SlotDecl::import`]); `registry` supplies proxy constructors
/// for the imports. The dock runs until [`Dock::close`]; await
/// [`Dock::closed`] to block on it.
pub async fn startup(
    hub_addr: &str,
    tag: &str,
    slots: Vec<SlotDecl>,
    registry: ProxyRegistry,
) -> Result<Dock, DockError> {
    Dock::startup(hub_addr, tag, slots, registry, Config::default()).await
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use quay::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CallError, Config, DispatchError, Dock, Hub, ProxyRegistry, Signaler, SlotDecl,
        SlotHandle, Value,
    };
}
