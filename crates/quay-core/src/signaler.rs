use std::sync::Arc;

use quay_codec::Value;

use crate::DispatchError;

/// A local implementation of a slot, callable by method name.
///
/// Implementations are dispatch tables: match on `method`, project the
/// arguments, run, and pack the returns in declaration order. A method
/// with no returns produces an empty vec. Argument projections bubble up
/// as [`DispatchError::Args`] via `?`; application failures are
/// [`DispatchError::App`]. Nothing here touches the network: the dock
/// invokes this from a worker task and ships the outcome back itself.
///
/// ```
/// use quay_codec::Value;
/// use quay_core::{DispatchError, Signaler};
///
/// struct Math;
///
/// impl Signaler for Math {
///     fn dispatch(&self, method: &str, args: &[Value]) -> Result<Vec<Value>, DispatchError> {
///         match method {
///             "add" => {
///                 let a = args[0].as_i32()?;
///                 let b = args[1].as_i32()?;
///                 Ok(vec![Value::I32(a + b)])
///             }
///             other => Err(DispatchError::UnknownMethod(other.to_owned())),
///         }
///     }
/// }
/// ```
pub trait Signaler: Send + Sync + 'static {
    fn dispatch(&self, method: &str, args: &[Value]) -> Result<Vec<Value>, DispatchError>;
}

/// A slot a dock either hosts or intends to import.
///
/// Slot names are globally unique across the fabric; the hub enforces it
/// at registration time.
pub struct SlotDecl {
    name: String,
    implementation: Option<Arc<dyn Signaler>>,
}

impl SlotDecl {
    /// A slot this dock hosts.
    pub fn export(name: impl Into<String>, implementation: impl Signaler) -> Self {
        Self {
            name: name.into(),
            implementation: Some(Arc::new(implementation)),
        }
    }

    /// A slot this dock will call on some other dock.
    pub fn import(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_local(&self) -> bool {
        self.implementation.is_some()
    }

    pub(crate) fn into_parts(self) -> (String, Option<Arc<dyn Signaler>>) {
        (self.name, self.implementation)
    }
}

impl std::fmt::Debug for SlotDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotDecl")
            .field("name", &self.name)
            .field("local", &self.is_local())
            .finish()
    }
}
