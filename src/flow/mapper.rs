use std::fmt::Debug;

/// Read access to an attribute scope (the instance, or one task).
///
/// Lookups fall through from runtime values to the static declarations of
/// the scope, so a mapper always sees declared defaults.
pub trait Scope {
    fn attr_type(&self, name: &str) -> Option<String>;
    fn attr_value(&self, name: &str) -> Option<String>;
}

/// A scope that also accepts writes. `set_attr_value` is type-preserving:
/// writing to a name the scope does not know is a no-op.
pub trait ScopeMut: Scope {
    fn set_attr_value(&mut self, name: &str, value: &str);
}

/// Moves values between two scopes. The engine passes scopes
/// directionally: instance → task data for input mapping, task data →
/// instance for output mapping. How values are selected and transformed
/// is entirely up to the implementation.
pub trait Mapper: Send + Sync + Debug {
    fn apply(&self, source: &dyn Scope, target: &mut dyn ScopeMut);
}
