use std::any::Any;
use std::collections::HashMap;

use crate::SlotHandle;

/// Constructor for one interface's generated proxy. Receives the call
/// binding and returns the proxy as an opaque object for
/// [`Dock::visit`](crate::Dock::visit) to downcast.
pub type ProxyMaker = fn(SlotHandle) -> Box<dyn Any + Send + Sync>;

/// Interface name → proxy constructor.
///
/// Generated code registers one maker per interface; the dock consults
/// the registry when an imported slot is first visited. The registry is
/// plain data passed into [`Dock::startup`](crate::Dock::startup): there
/// is no process-global table and no registration ordering to reason
/// about.
#[derive(Default)]
pub struct ProxyRegistry {
    makers: HashMap<String, ProxyMaker>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a maker, replacing any previous one for the same name.
    pub fn register(&mut self, name: impl Into<String>, maker: ProxyMaker) -> &mut Self {
        self.makers.insert(name.into(), maker);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.makers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.makers.keys().map(String::as_str)
    }

    pub(crate) fn make(
        &self,
        name: &str,
        handle: SlotHandle,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        self.makers.get(name).map(|maker| maker(handle))
    }
}
