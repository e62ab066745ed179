//! Protocol messages and framing.
//!
//! Every message on a quay connection (control or RPC) is one frame:
//!
//! ```text
//! [ u32 body_len ] [ u32 kind ] [ body ]
//! ```
//!
//! `body_len` counts everything after the length field, i.e. the kind word
//! plus the body. Both words are big-endian. Bodies are a concatenation of
//! independent [`quay_codec::Value`] frames in kind-specific order, not an
//! outer array.

mod error;
pub mod kind;
mod packet;
mod stream;

pub use error::*;
pub use packet::*;
pub use stream::*;
