use std::fmt;
use std::io;

use quay_codec::{DecodeError, TypeMismatch};

/// Connection-level failure while sending or receiving a frame.
///
/// `Io`, `Malformed`, `FrameTooLarge`, `UnknownKind`, and `Codec` are fatal
/// for the connection that produced them; `Closed` is the normal end of a
/// stream.
#[derive(Debug)]
pub enum WireError {
    Io(io::Error),
    /// The peer closed the stream cleanly between frames.
    Closed,
    /// The length prefix does not describe a well-formed frame.
    Malformed(String),
    FrameTooLarge {
        len: usize,
        max: usize,
    },
    UnknownKind(u32),
    /// A body value failed to decode.
    Codec(DecodeError),
    /// A body value decoded but holds the wrong variant for its field.
    Body(TypeMismatch),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Io(e) => write!(f, "i/o error: {e}"),
            WireError::Closed => write!(f, "connection closed"),
            WireError::Malformed(msg) => write!(f, "malformed frame: {msg}"),
            WireError::FrameTooLarge { len, max } => {
                write!(f, "frame of {len} bytes exceeds the {max} byte limit")
            }
            WireError::UnknownKind(k) => write!(f, "unknown message kind: {k}"),
            WireError::Codec(e) => write!(f, "body decode failed: {e}"),
            WireError::Body(e) => write!(f, "bad body field: {e}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(e) => Some(e),
            WireError::Codec(e) => Some(e),
            WireError::Body(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        WireError::Io(e)
    }
}

impl From<DecodeError> for WireError {
    fn from(e: DecodeError) -> Self {
        WireError::Codec(e)
    }
}

impl From<TypeMismatch> for WireError {
    fn from(e: TypeMismatch) -> Self {
        WireError::Body(e)
    }
}
