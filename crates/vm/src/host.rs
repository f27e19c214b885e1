//! Host (native) functions and the registry they are linked from.

use tessera_common::{HostId, Value};

use crate::error::RuntimeError;
use crate::machine::Interpreter;

/// Native function callable from bytecode.
///
/// Arguments arrive unpacked: one value per declared parameter, each
/// carrying its concrete runtime type, including dynamic (`any`) ones.
pub type HostFunction = fn(&mut Interpreter<'_>, &[Value]) -> Result<Value, RuntimeError>;

/// Table of host functions addressed by name and by [`HostId`].
#[derive(Default, Clone)]
pub struct HostRegistry {
    entries: Vec<(String, HostFunction)>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `function` under `name`. Re-registering a name replaces the
    /// function and keeps its id.
    pub fn register(&mut self, name: impl Into<String>, function: HostFunction) -> HostId {
        let name = name.into();
        if let Some(id) = self.find(&name) {
            self.entries[id.0 as usize].1 = function;
            return id;
        }
        self.entries.push((name, function));
        HostId(self.entries.len() as u32 - 1)
    }

    pub fn find(&self, name: &str) -> Option<HostId> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| HostId(i as u32))
    }

    pub fn get(&self, id: HostId) -> Option<HostFunction> {
        self.entries.get(id.0 as usize).map(|(_, f)| *f)
    }

    pub fn name(&self, id: HostId) -> Option<&str> {
        self.entries.get(id.0 as usize).map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Receiver for the `send` side channel. The VM only hands the message
/// over; delivery happens outside the interpreter.
pub trait MessageHandler {
    fn on_send(&mut self, destination: &str, message: serde_json::Value) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(_: &mut Interpreter<'_>, _: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::int(1))
    }

    fn two(_: &mut Interpreter<'_>, _: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::int(2))
    }

    #[test]
    fn register_and_find() {
        let mut registry = HostRegistry::new();
        let a = registry.register("one", one);
        let b = registry.register("two", two);
        assert_ne!(a, b);
        assert_eq!(registry.find("two"), Some(b));
        assert_eq!(registry.name(a), Some("one"));
        assert!(registry.get(HostId(9)).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reregistering_keeps_id() {
        let mut registry = HostRegistry::new();
        let a = registry.register("f", one);
        let b = registry.register("f", two);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }
}
