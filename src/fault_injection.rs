use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::errors::EntGraphError;

/// Points inside multi-statement writes where a test can force a failure.
/// Each fires after the statements ran and before the transaction commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CreateBeforeCommit,
    BatchCreateBeforeCommit,
    UpdateBeforeCommit,
    UpdateManyBeforeCommit,
}

struct FaultEntry {
    remaining: usize,
}

fn registry() -> &'static Mutex<AHashMap<FaultPoint, FaultEntry>> {
    static REGISTRY: OnceLock<Mutex<AHashMap<FaultPoint, FaultEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(AHashMap::new()))
}

pub fn reset_faults() {
    registry().lock().clear();
}

/// Fail the next `failures` passes through `point`.
pub fn configure_fault(point: FaultPoint, failures: usize) {
    let mut guard = registry().lock();
    if failures == 0 {
        guard.remove(&point);
    } else {
        guard.insert(
            point,
            FaultEntry {
                remaining: failures,
            },
        );
    }
}

pub(crate) fn check_fault(point: FaultPoint) -> Result<(), EntGraphError> {
    let mut guard = registry().lock();
    if let Some(entry) = guard.get_mut(&point)
        && entry.remaining > 0
    {
        entry.remaining -= 1;
        if entry.remaining == 0 {
            guard.remove(&point);
        }
        return Err(EntGraphError::fault_injection(format!("{point:?}")));
    }
    Ok(())
}
