//! Message kind words.
//!
//! Stable wire IDs; peers dispatch on these exact values.

/// In-band failure report; body is the error string.
pub const ERROR: u32 = 0;
/// Liveness tick, empty body, never answered.
pub const HEARTBEAT: u32 = 1;
/// Dock announces the slots it hosts.
pub const REGISTER_REQUEST: u32 = 2;
/// Hub ack to a registration; body is the serving port assigned to the dock.
pub const HUB_REGISTER_RESPONSE: u32 = 3;
/// Per-slot registration ack. Reserved: decoded for compatibility, not sent.
pub const DOCK_REGISTER_RESPONSE: u32 = 4;
/// Request for the addresses (hub) or confirmation (dock) of named slots.
pub const IMPORT_REQUEST: u32 = 5;
/// Answer to an import request, order-preserving, "" for misses.
pub const IMPORT_RESPONSE: u32 = 6;
/// Request for the address hosting one slot.
pub const QUERY_REQUEST: u32 = 7;
/// Answer to a query.
pub const QUERY_RESPONSE: u32 = 8;
/// Method invocation on a remote slot.
pub const RPC_REQUEST: u32 = 9;
/// Result (or in-band error) of an invocation.
pub const RPC_RESPONSE: u32 = 10;
