use std::fmt;

/// A typed projection was asked of a [`crate::Value`] holding an
/// incompatible variant, or a numeric conversion would have lost bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch {
    /// What the caller asked for.
    pub expected: &'static str,
    /// What the value actually holds.
    pub found: &'static str,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type mismatch: expected {}, found {}",
            self.expected, self.found
        )
    }
}

impl std::error::Error for TypeMismatch {}

/// Nil is not a legal map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NilKey;

impl fmt::Display for NilKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nil is not a valid map key")
    }
}

impl std::error::Error for NilKey {}
