//! Per-app session bookkeeping: boundaries, in-flight calls, subscriptions
//! and position watches.

use crate::protocol::Outbound;
use crate::sync::lock;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

/// Message-only channel into one mini-app's isolation boundary.
pub trait AppBoundary: Send + Sync {
    fn deliver(&self, message: Outbound);
}

#[derive(Default)]
struct SessionState {
    boundaries: HashMap<String, Arc<dyn AppBoundary>>,
    in_flight: HashMap<String, HashMap<u64, AbortHandle>>,
    subscriptions: HashMap<String, BTreeSet<String>>,
    watches: HashMap<String, BTreeSet<String>>,
    next_call_id: u64,
}

#[derive(Default)]
pub(crate) struct SessionTable {
    state: Mutex<SessionState>,
}

impl SessionTable {
    pub fn attach(&self, app_id: &str, boundary: Arc<dyn AppBoundary>) -> bool {
        lock(&self.state)
            .boundaries
            .insert(app_id.to_string(), boundary)
            .is_some()
    }

    pub fn boundary(&self, app_id: &str) -> Option<Arc<dyn AppBoundary>> {
        lock(&self.state).boundaries.get(app_id).cloned()
    }

    /// Whether `boundary` itself, not merely some boundary, is attached for `app_id`.
    pub fn is_attached(&self, app_id: &str, boundary: &Arc<dyn AppBoundary>) -> bool {
        lock(&self.state)
            .boundaries
            .get(app_id)
            .is_some_and(|current| Arc::ptr_eq(current, boundary))
    }

    pub fn track(&self, app_id: &str, handle: AbortHandle) -> u64 {
        let mut state = lock(&self.state);
        state.next_call_id += 1;
        let call_id = state.next_call_id;
        state
            .in_flight
            .entry(app_id.to_string())
            .or_default()
            .insert(call_id, handle);
        call_id
    }

    pub fn untrack(&self, app_id: &str, call_id: u64) {
        let mut state = lock(&self.state);
        if let Some(calls) = state.in_flight.get_mut(app_id) {
            calls.remove(&call_id);
            if calls.is_empty() {
                state.in_flight.remove(app_id);
            }
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self, app_id: &str) -> usize {
        lock(&self.state)
            .in_flight
            .get(app_id)
            .map_or(0, HashMap::len)
    }

    pub fn subscribe(&self, app_id: &str, event: &str) -> bool {
        lock(&self.state)
            .subscriptions
            .entry(app_id.to_string())
            .or_default()
            .insert(event.to_string())
    }

    pub fn unsubscribe(&self, app_id: &str, event: &str) -> bool {
        lock(&self.state)
            .subscriptions
            .get_mut(app_id)
            .is_some_and(|events| events.remove(event))
    }

    /// Attached boundaries of apps subscribed to `event`.
    pub fn subscribers(&self, event: &str) -> Vec<(String, Arc<dyn AppBoundary>)> {
        let state = lock(&self.state);
        state
            .subscriptions
            .iter()
            .filter(|(_, events)| events.contains(event))
            .filter_map(|(app_id, _)| {
                state
                    .boundaries
                    .get(app_id)
                    .map(|boundary| (app_id.clone(), Arc::clone(boundary)))
            })
            .collect()
    }

    pub fn add_watch(&self, app_id: &str, watch_id: &str) -> bool {
        lock(&self.state)
            .watches
            .entry(app_id.to_string())
            .or_default()
            .insert(watch_id.to_string())
    }

    pub fn clear_watch(&self, app_id: &str, watch_id: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(watches) = state.watches.get_mut(app_id) else {
            return false;
        };
        let removed = watches.remove(watch_id);
        if watches.is_empty() {
            state.watches.remove(app_id);
        }
        removed
    }

    /// Watch ids and boundary of every attached app with an active watch.
    pub fn watchers(&self) -> Vec<(Vec<String>, Arc<dyn AppBoundary>)> {
        let state = lock(&self.state);
        state
            .watches
            .iter()
            .filter_map(|(app_id, watch_ids)| {
                state.boundaries.get(app_id).map(|boundary| {
                    (watch_ids.iter().cloned().collect(), Arc::clone(boundary))
                })
            })
            .collect()
    }

    /// Aborts in-flight calls, drops subscriptions and watches, and detaches
    /// the boundary.
    ///
    /// Returns the number of aborted calls.
    pub fn close(&self, app_id: &str) -> usize {
        let calls = {
            let mut state = lock(&self.state);
            state.subscriptions.remove(app_id);
            state.watches.remove(app_id);
            state.boundaries.remove(app_id);
            state.in_flight.remove(app_id).unwrap_or_default()
        };
        let aborted = calls.len();
        for handle in calls.into_values() {
            handle.abort();
        }
        aborted
    }
}
