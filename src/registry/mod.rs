//! Keyed dependency store with global and group-local scoping.
//!
//! A [`DependencyRegistry`] is a mutable map from string keys to
//! capability-erased values. The router owns one global registry; each route
//! group owns (or shares with its sub-groups) a local one. At dispatch time
//! the router copies the global bindings and then the matched route's
//! bindings into the request [`Context`](crate::Context), so a group binding
//! shadows a global binding of the same key.
//!
//! The registry is never a module-level singleton: it is owned state passed
//! by reference, so multiple routers can coexist in one process.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

/// A capability-erased dependency value.
///
/// Callers narrow it back to a concrete type through
/// [`Context::dependency`](crate::Context::dependency).
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// Errors produced when resolving a dependency from a request context.
///
/// Both variants are per-request conditions for the calling handler to
/// report (typically as a 500 when the dependency was required); neither is
/// ever fatal to the process.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// No binding exists for the requested key in the merged scope.
    #[error("no dependency bound for key `{key}`")]
    NotFound { key: String },

    /// A binding exists but does not narrow to the requested type.
    #[error("dependency `{key}` does not narrow to `{expected}`")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },
}

/// A mutable, keyed store of dependency bindings.
///
/// `provide` inserts or overwrites; last write wins, with no uniqueness
/// constraint. The key map is guarded by a read-mostly lock so that the
/// supported pattern — populate during single-threaded configuration, read
/// concurrently during traffic — is cheap, and unsupported concurrent
/// mutation still cannot corrupt state.
///
/// # Examples
///
/// ```
/// use rill::registry::DependencyRegistry;
///
/// let registry = DependencyRegistry::new();
/// registry.provide("greeting", "hello".to_owned());
/// registry.provide("greeting", "hola".to_owned()); // last write wins
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Default)]
pub struct DependencyRegistry {
    bindings: RwLock<HashMap<String, Dependency>>,
}

impl DependencyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` under `key`, overwriting any previous binding.
    pub fn provide<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.provide_shared(key, Arc::new(value));
    }

    /// Binds an already-erased value under `key`. Useful when the same
    /// dependency instance is shared across registries.
    pub fn provide_shared(&self, key: impl Into<String>, value: Dependency) {
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Returns the binding for `key`, if any.
    pub fn resolve(&self, key: &str) -> Option<Dependency> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copies every current binding into `target`, overwriting collisions.
    ///
    /// This is the O(n) injection the router performs once per dispatch;
    /// applying the global registry first and the route's registry second
    /// yields the shadowing order the scoping rules require.
    pub fn copy_into(&self, target: &mut HashMap<String, Dependency>) {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in bindings.iter() {
            target.insert(key.clone(), Arc::clone(value));
        }
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DependencyRegistry")
            .field("keys", &bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}
