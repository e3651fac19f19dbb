//! Process-wide registry of live runtimes.
//!
//! Components get their runtime handle at construction time. This registry
//! only serves top-level wiring that has no handle to pass around, such as a
//! signal hook installed by an embedder.

use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicU64, Ordering},
};

use crate::runtime::Runtime;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static INSTANCES: Mutex<Vec<(u64, Weak<Runtime>)>> = Mutex::new(Vec::new());

pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn register(id: u64, runtime: Weak<Runtime>) {
    let mut instances = INSTANCES.lock().unwrap_or_else(|e| e.into_inner());
    instances.retain(|(_, weak)| weak.strong_count() > 0);
    instances.push((id, runtime));
}

pub(crate) fn deregister(id: u64) {
    INSTANCES
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .retain(|(other, _)| *other != id);
}

/// Number of runtimes currently alive in this process.
pub fn live_count() -> usize {
    INSTANCES
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .filter(|(_, weak)| weak.strong_count() > 0)
        .count()
}

/// The runtime of this process, if exactly one is alive.
pub fn current() -> Option<Arc<Runtime>> {
    // Upgraded handles are dropped outside the lock: dropping the last one
    // deregisters.
    let live: Vec<_> = {
        let instances = INSTANCES.lock().unwrap_or_else(|e| e.into_inner());
        instances.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    };
    if live.len() == 1 {
        live.into_iter().next()
    } else {
        None
    }
}
