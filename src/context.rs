//! Call context carried through every operation.
//!
//! A [`Context`] bundles the cancellation flag and deadline checked before each
//! statement, the terminal privacy decision cached for one logical operation,
//! and typed request values (for example the viewer a rule inspects).

use std::{
    any::{Any, TypeId},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use ahash::AHashMap;

use crate::{errors::EntGraphError, privacy::Decision};

/// Handle that cancels every context derived from the one it was created with.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

type Values = AHashMap<TypeId, Arc<dyn Any + Send + Sync>>;

#[derive(Clone, Default)]
pub struct Context {
    /// Handles of this context and every cancelable ancestor.
    cancel: Vec<CancelHandle>,
    deadline: Option<Instant>,
    decision: Option<Result<(), EntGraphError>>,
    values: Arc<Values>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("canceled", &self.is_canceled())
            .field("deadline", &self.deadline)
            .field("decision", &self.decision)
            .field("values", &self.values.len())
            .finish()
    }
}

impl Context {
    /// Empty context: never canceled, no decision, no values.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancelable context. Canceling the returned handle also cancels
    /// every context cloned from the result. Ancestor handles stay in effect.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let handle = CancelHandle::default();
        let mut ctx = self.clone();
        ctx.cancel.push(handle.clone());
        (ctx, handle)
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.iter().any(CancelHandle::is_canceled)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a typed value; a later value of the same type shadows earlier ones.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        let mut ctx = self.clone();
        ctx.values = Arc::new(values);
        ctx
    }

    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Fails with [`EntGraphError::Canceled`] once the context is canceled or
    /// past its deadline.
    pub fn check(&self) -> Result<(), EntGraphError> {
        if self.is_canceled() {
            return Err(EntGraphError::canceled("context canceled"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(EntGraphError::canceled("context deadline exceeded"));
        }
        Ok(())
    }

    /// Pin a privacy decision on a derived context. `Skip` leaves the context
    /// untouched.
    pub fn with_decision(&self, decision: Decision) -> Self {
        let mut ctx = self.clone();
        match decision {
            Decision::Skip => {}
            Decision::Allow => ctx.decision = Some(Ok(())),
            Decision::Deny(reason) => ctx.decision = Some(Err(EntGraphError::denied(reason))),
        }
        ctx
    }

    /// The cached terminal decision, if one was reached on this context.
    pub fn decision(&self) -> Option<&Result<(), EntGraphError>> {
        self.decision.as_ref()
    }

    pub(crate) fn cache_decision(&mut self, outcome: Result<(), EntGraphError>) {
        self.decision = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Viewer(&'static str);

    #[test]
    fn cancel_reaches_clones() {
        let (ctx, handle) = Context::background().with_cancel();
        let child = ctx.with_value(Viewer("a8m"));
        assert!(child.check().is_ok());
        handle.cancel();
        assert!(child.check().unwrap_err().is_canceled());
    }

    #[test]
    fn parent_cancel_reaches_cancelable_children() {
        let (parent, parent_handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(parent.check().is_ok());
        assert!(child.check().is_err());

        let (child, _) = parent.with_cancel();
        parent_handle.cancel();
        assert!(parent.check().unwrap_err().is_canceled());
        assert!(child.check().unwrap_err().is_canceled());
    }

    #[test]
    fn expired_deadline_fails_check() {
        let ctx = Context::background().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.check().unwrap_err().is_canceled());
    }

    #[test]
    fn values_shadow_and_do_not_leak_to_parent() {
        let parent = Context::background().with_value(Viewer("first"));
        let child = parent.with_value(Viewer("second"));
        assert_eq!(parent.value::<Viewer>(), Some(&Viewer("first")));
        assert_eq!(child.value::<Viewer>(), Some(&Viewer("second")));
        assert_eq!(child.value::<u32>(), None);
    }

    #[test]
    fn skip_does_not_pin_a_decision() {
        let ctx = Context::background().with_decision(Decision::Skip);
        assert!(ctx.decision().is_none());
        let ctx = ctx.with_decision(Decision::Allow);
        assert_eq!(ctx.decision(), Some(&Ok(())));
    }
}
