//! LIFO teardown registry for acquired resources.
//!
//! Every successful resource acquisition pushes exactly one teardown action
//! onto the ledger before the next acquisition begins. On shutdown, or when
//! initialization fails partway, [`ResourceLedger::unwind_all`] releases
//! everything in exact reverse acquisition order. The ledger is the sole
//! cleanup-ordering mechanism; there is no separate dependency graph, so
//! ordering correctness depends entirely on push order matching true
//! acquire order.

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

/// A single failed teardown action.
#[derive(Error, Debug)]
#[error("teardown of `{label}` failed: {message}")]
pub struct TeardownFailure {
    /// Label the action was registered under.
    pub label: String,
    /// Failure message reported by the action.
    pub message: String,
}

/// One or more teardown actions failed during unwind.
///
/// Partial failure never aborts the remaining unwinds, so every failure is
/// collected and reported as a list rather than a single error.
#[derive(Error, Debug)]
#[error("{} teardown action(s) failed during unwind", failures.len())]
pub struct TeardownError {
    /// Every failure encountered, in unwind (reverse push) order.
    pub failures: Vec<TeardownFailure>,
}

type TeardownAction = Box<dyn FnOnce() -> Result<(), String>>;

struct LedgerEntry {
    label: String,
    action: TeardownAction,
}

/// Ordered (LIFO) registry of teardown actions.
///
/// Created fresh per application run. Each entry captures exactly the
/// resource(s) it must release and nulls out the owning reference after
/// release.
#[derive(Default)]
pub struct ResourceLedger {
    entries: Vec<LedgerEntry>,
}

impl ResourceLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a teardown action for a resource that was just acquired.
    ///
    /// Actions report failure through their `Result`; the message is
    /// attached to `label` when aggregated.
    pub fn push<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Result<(), String> + 'static,
    {
        let label = label.into();
        tracing::trace!("ledger: acquired `{label}`");
        self.entries.push(LedgerEntry {
            label,
            action: Box::new(action),
        });
    }

    /// Number of registered teardown actions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no teardown actions are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pop and invoke every entry from most-recently-pushed to
    /// least-recently-pushed.
    ///
    /// Every action is attempted exactly once, even when earlier ones fail
    /// or panic; failures are aggregated into [`TeardownError`]. After this
    /// returns the ledger is empty and a second call is a no-op.
    pub fn unwind_all(&mut self) -> Result<(), TeardownError> {
        let mut failures = Vec::new();

        while let Some(entry) = self.entries.pop() {
            tracing::debug!("ledger: releasing `{}`", entry.label);
            let outcome = catch_unwind(AssertUnwindSafe(entry.action));
            let result = match outcome {
                Ok(result) => result,
                Err(panic) => Err(panic_message(&panic)),
            };
            if let Err(message) = result {
                tracing::error!("ledger: teardown of `{}` failed: {message}", entry.label);
                failures.push(TeardownFailure {
                    label: entry.label,
                    message,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "teardown action panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_ledger() -> (ResourceLedger, Rc<RefCell<Vec<&'static str>>>) {
        (ResourceLedger::new(), Rc::new(RefCell::new(Vec::new())))
    }

    #[test]
    fn unwinds_in_reverse_push_order() {
        let (mut ledger, order) = recording_ledger();
        for name in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            ledger.push(name, move || {
                order.borrow_mut().push(name);
                Ok(())
            });
        }

        ledger.unwind_all().unwrap();
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn failure_does_not_stop_remaining_unwinds() {
        let (mut ledger, order) = recording_ledger();
        {
            let order = Rc::clone(&order);
            ledger.push("a", move || {
                order.borrow_mut().push("a");
                Ok(())
            });
        }
        ledger.push("b", || Err("release rejected".to_string()));
        {
            let order = Rc::clone(&order);
            ledger.push("c", move || {
                order.borrow_mut().push("c");
                Ok(())
            });
        }

        let err = ledger.unwind_all().unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].label, "b");
        assert_eq!(*order.borrow(), vec!["c", "a"]);
    }

    #[test]
    fn panicking_action_is_contained() {
        let (mut ledger, order) = recording_ledger();
        {
            let order = Rc::clone(&order);
            ledger.push("a", move || {
                order.borrow_mut().push("a");
                Ok(())
            });
        }
        ledger.push("b", || panic!("boom"));

        let err = ledger.unwind_all().unwrap_err();
        assert_eq!(err.failures[0].label, "b");
        assert_eq!(err.failures[0].message, "boom");
        assert_eq!(*order.borrow(), vec!["a"]);
    }

    #[test]
    fn empty_after_unwind_and_second_unwind_is_noop() {
        let mut ledger = ResourceLedger::new();
        ledger.push("a", || Ok(()));
        assert_eq!(ledger.len(), 1);

        ledger.unwind_all().unwrap();
        assert!(ledger.is_empty());

        // No entries remain, so this must succeed without invoking anything.
        ledger.unwind_all().unwrap();
        assert!(ledger.is_empty());
    }
}
