//! Extension Hooks
//!
//! The only mechanism by which a multi-tenant wrapper can reject access.
//! Before each core operation, `authorize`/`validate` run; after,
//! `on_complete` runs. Any hook may raise, aborting the operation and
//! propagating the error to the caller.

use serde_json::Value;

use crate::error::Result;

/// Identifies which core operation a hook call surrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Retain,
    Recall,
    Consolidate,
    Reflect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Retain => "retain",
            Operation::Recall => "recall",
            Operation::Consolidate => "consolidate",
            Operation::Reflect => "reflect",
        }
    }
}

/// Outcome of a completed operation, passed to `on_complete`.
pub enum Outcome<'a> {
    Success(&'a Value),
    Failure(&'a str),
}

/// Optional authorization/validation/completion hooks around every core
/// operation. A no-op default implementation is provided so most banks
/// run with no wrapper at all.
pub trait ExtensionHooks: Send + Sync {
    /// Reject access before anything else runs. Raising aborts the
    /// operation.
    fn authorize(&self, _op: Operation, _bank_id: &str, _tenant: Option<&str>, _input: &Value) -> Result<()> {
        Ok(())
    }

    /// Validate input, after authorization. Raising aborts the operation.
    fn validate(&self, _op: Operation, _bank_id: &str, _input: &Value) -> Result<()> {
        Ok(())
    }

    /// Observe the outcome. Errors here are logged, never propagated —
    /// the operation has already completed from the caller's perspective.
    fn on_complete(&self, _op: Operation, _bank_id: &str, _outcome: Outcome<'_>) {}
}

/// The hooks used when a bank carries no extension wrapper.
pub struct NoopHooks;

impl ExtensionHooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RejectingHooks;

    impl ExtensionHooks for RejectingHooks {
        fn authorize(&self, _op: Operation, _bank_id: &str, _tenant: Option<&str>, _input: &Value) -> Result<()> {
            Err(crate::error::BankError::Validation("tenant not allowed".into()))
        }
    }

    #[test]
    fn noop_hooks_always_authorize() {
        let hooks = NoopHooks;
        assert!(hooks.authorize(Operation::Retain, "b1", None, &Value::Null).is_ok());
    }

    #[test]
    fn rejecting_hook_propagates_error() {
        let hooks = RejectingHooks;
        assert!(hooks.authorize(Operation::Retain, "b1", None, &Value::Null).is_err());
    }

    #[test]
    fn on_complete_observes_outcome() {
        let observed = AtomicBool::new(false);
        struct ObservingHooks<'a>(&'a AtomicBool);
        impl<'a> ExtensionHooks for ObservingHooks<'a> {
            fn on_complete(&self, _op: Operation, _bank_id: &str, outcome: Outcome<'_>) {
                if matches!(outcome, Outcome::Success(_)) {
                    self.0.store(true, Ordering::SeqCst);
                }
            }
        }
        let hooks = ObservingHooks(&observed);
        hooks.on_complete(Operation::Recall, "b1", Outcome::Success(&Value::Null));
        assert!(observed.load(Ordering::SeqCst));
    }
}
