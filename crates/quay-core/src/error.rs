use std::fmt;
use std::io;

use quay_codec::TypeMismatch;
use quay_wire::WireError;

/// Why a callee-side dispatch failed. The rendered form travels back in
/// the response's `err` field; the connection stays open.
#[derive(Debug)]
pub enum DispatchError {
    UnknownSlot(String),
    UnknownMethod(String),
    /// An argument held the wrong variant for its parameter.
    Args(TypeMismatch),
    /// The signaler itself reported failure.
    App(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownSlot(slot) => write!(f, "unknown slot: {slot}"),
            DispatchError::UnknownMethod(method) => write!(f, "unknown method: {method}"),
            DispatchError::Args(e) => write!(f, "{e}"),
            DispatchError::App(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Args(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TypeMismatch> for DispatchError {
    fn from(e: TypeMismatch) -> Self {
        DispatchError::Args(e)
    }
}

/// What a caller observes when an outbound call fails.
#[derive(Debug)]
pub enum CallError {
    /// Sending or framing failed on the peer connection.
    Wire(WireError),
    /// The connection died while the call was in flight.
    ConnectionReset,
    /// The configured per-call deadline expired. Synthesized locally;
    /// nothing about it travels on the wire.
    Timeout,
    /// The remote end reported failure in-band.
    Remote(String),
    /// No dock serves this slot, or the dialed peer would not confirm it.
    UnknownSlot(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Wire(e) => write!(f, "{e}"),
            CallError::ConnectionReset => write!(f, "connection reset"),
            CallError::Timeout => write!(f, "call timed out"),
            CallError::Remote(msg) => write!(f, "remote error: {msg}"),
            CallError::UnknownSlot(slot) => write!(f, "unknown slot: {slot}"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WireError> for CallError {
    fn from(e: WireError) -> Self {
        CallError::Wire(e)
    }
}

/// Why a dock failed to come up or stay up.
#[derive(Debug)]
pub enum DockError {
    /// Dialing the hub or binding the acceptor failed.
    Io(io::Error),
    Wire(WireError),
    /// The hub rejected the registration batch.
    Registration(String),
}

impl fmt::Display for DockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockError::Io(e) => write!(f, "i/o error: {e}"),
            DockError::Wire(e) => write!(f, "{e}"),
            DockError::Registration(msg) => write!(f, "registration rejected: {msg}"),
        }
    }
}

impl std::error::Error for DockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockError::Io(e) => Some(e),
            DockError::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DockError {
    fn from(e: io::Error) -> Self {
        DockError::Io(e)
    }
}

impl From<WireError> for DockError {
    fn from(e: WireError) -> Self {
        DockError::Wire(e)
    }
}
