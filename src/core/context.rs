//! Ambient logging context
//!
//! Key/value pairs entered into the context are attached to every event
//! emitted while the scope is active. Scopes nest: an inner scope sees the
//! keys of the outer ones, and leaving a scope restores exactly the state that
//! was active before it was entered.
//!
//! The scope stack is kept per thread. Two threads entering scopes at the same
//! time never observe each other's keys, and an event handed to a background
//! thread carries the snapshot taken on the emitting thread.
//!
//! # Example
//!
//! ```
//! use scriptorium::core::context::{log_context, ContextStore};
//! use scriptorium::core::fields::fields;
//!
//! log_context(fields([("request_id", "abc")]), || {
//!     assert!(ContextStore::snapshot().contains_key("request_id"));
//! });
//! assert!(ContextStore::snapshot().is_empty());
//! ```

use super::fields::ContextMap;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    // Each entry holds the fully merged state of one scope.
    static SCOPES: RefCell<Vec<ContextMap>> = const { RefCell::new(Vec::new()) };
}

/// Entry points to the per-thread scope stack
pub struct ContextStore;

impl ContextStore {
    /// Push a scope that merges `mapping` over the current ambient state.
    ///
    /// Keys in `mapping` win over keys already present. The scope is exited
    /// when the returned guard is dropped, including during unwinding.
    #[must_use = "the scope is exited as soon as the guard is dropped"]
    pub fn enter(mapping: ContextMap) -> ContextScope {
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let mut merged = scopes.last().cloned().unwrap_or_default();
            merged.extend(mapping);
            let depth = scopes.len();
            scopes.push(merged);
            depth
        });

        ContextScope {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Current merged mapping for this thread
    pub fn snapshot() -> ContextMap {
        SCOPES.with(|scopes| scopes.borrow().last().cloned().unwrap_or_default())
    }

    /// Number of scopes currently active on this thread
    pub fn depth() -> usize {
        SCOPES.with(|scopes| scopes.borrow().len())
    }

    fn restore(depth: usize) {
        // Dropping an outer guard before an inner one also discards the inner
        // scope: the state always returns to what it was before `depth`.
        SCOPES.with(|scopes| scopes.borrow_mut().truncate(depth));
    }
}

/// Guard for one entered scope
pub struct ContextScope {
    depth: usize,
    // The guard refers to this thread's stack and must stay on it.
    _not_send: PhantomData<*const ()>,
}

impl ContextScope {
    /// Leave the scope explicitly
    pub fn exit(self) {}
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        ContextStore::restore(self.depth);
    }
}

/// Run `body` with `mapping` merged into the ambient context
pub fn log_context<F, R>(mapping: ContextMap, body: F) -> R
where
    F: FnOnce() -> R,
{
    let _scope = ContextStore::enter(mapping);
    body()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::{fields, FieldValue};
    use std::panic;

    #[test]
    fn test_nested_scopes_restore() {
        let outer = ContextStore::enter(fields([("outer", "value")]));
        {
            let _inner = ContextStore::enter(fields([("inner", "nested")]));
            let snap = ContextStore::snapshot();
            assert_eq!(snap["outer"], FieldValue::from("value"));
            assert_eq!(snap["inner"], FieldValue::from("nested"));
        }
        let snap = ContextStore::snapshot();
        assert!(snap.contains_key("outer"));
        assert!(!snap.contains_key("inner"));

        outer.exit();
        assert!(ContextStore::snapshot().is_empty());
        assert_eq!(ContextStore::depth(), 0);
    }

    #[test]
    fn test_inner_scope_overrides_key() {
        let _a = ContextStore::enter(fields([("user", "alice")]));
        {
            let _b = ContextStore::enter(fields([("user", "bob")]));
            assert_eq!(ContextStore::snapshot()["user"], FieldValue::from("bob"));
        }
        assert_eq!(ContextStore::snapshot()["user"], FieldValue::from("alice"));
    }

    #[test]
    fn test_panic_inside_scope_restores_state() {
        let _base = ContextStore::enter(fields([("base", 1)]));
        let before = ContextStore::snapshot();

        let result = panic::catch_unwind(|| {
            log_context(fields([("test", "value")]), || {
                panic!("scope body failed");
            })
        });

        assert!(result.is_err());
        assert_eq!(ContextStore::snapshot(), before);
        assert_eq!(ContextStore::depth(), 1);
    }

    #[test]
    fn test_out_of_order_drop() {
        let outer = ContextStore::enter(fields([("a", 1)]));
        let inner = ContextStore::enter(fields([("b", 2)]));
        drop(outer);
        assert!(ContextStore::snapshot().is_empty());
        drop(inner);
        assert!(ContextStore::snapshot().is_empty());
    }

    #[test]
    fn test_threads_are_isolated() {
        let _scope = ContextStore::enter(fields([("thread", "main")]));
        let seen = std::thread::spawn(ContextStore::snapshot).join().unwrap();
        assert!(seen.is_empty());
        assert_eq!(ContextStore::snapshot()["thread"], FieldValue::from("main"));
    }
}
