use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::devices::gps::LocationSample;

/// Samples at least this inaccurate (meters) are kept but never displayed.
pub const ACCURACY_THRESHOLD_METERS: f32 = 10.0;

/// Receives a call after every insert or clear.
///
/// Calls arrive synchronously on whichever thread changed the store. A
/// listener that must run elsewhere (a display task, say) has to forward the
/// wake-up itself.
pub trait LocationListener: Send + Sync {
    fn on_location_data_changed(&self);
}

impl<F> LocationListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_location_data_changed(&self) {
        self()
    }
}

/// Handle returned by [`LocationStore::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct StoreState {
    samples: Vec<LocationSample>,
    listeners: Vec<(SubscriptionId, Arc<dyn LocationListener>)>,
}

/// Shared in-memory sink for every recorded sample, and the single source of
/// what should currently be displayed.
///
/// One instance is created by the composition root and handed around as an
/// `Arc`. Samples are never evicted.
#[derive(Default)]
pub struct LocationStore {
    state: RwLock<StoreState>,
    next_subscription: AtomicU64,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Accurate samples, most recent first.
    ///
    /// Samples sharing a timestamp keep their insertion order.
    pub fn get_locations(&self) -> Vec<LocationSample> {
        let mut locations: Vec<LocationSample> = self
            .read()
            .samples
            .iter()
            .filter(|sample| sample.accuracy < ACCURACY_THRESHOLD_METERS)
            .cloned()
            .collect();
        locations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        locations
    }

    /// The first entry `get_locations` would return, without copying the rest.
    pub fn latest_location(&self) -> Option<LocationSample> {
        self.read()
            .samples
            .iter()
            .filter(|sample| sample.accuracy < ACCURACY_THRESHOLD_METERS)
            .fold(None, |latest: Option<&LocationSample>, sample| match latest {
                Some(best) if best.timestamp >= sample.timestamp => Some(best),
                _ => Some(sample),
            })
            .cloned()
    }

    /// Appends `sample` and notifies every listener, accurate or not.
    pub fn insert_location(&self, sample: LocationSample) {
        let listeners = {
            let mut state = self.write();
            trace!("Storing sample {}", sample);
            state.samples.push(sample);
            Self::snapshot_listeners(&state)
        };
        Self::publish_change_notifications(&listeners);
    }

    pub fn clear(&self) {
        let listeners = {
            let mut state = self.write();
            debug!("🗑️ Clearing {} stored samples", state.samples.len());
            state.samples.clear();
            Self::snapshot_listeners(&state)
        };
        Self::publish_change_notifications(&listeners);
    }

    /// Registers `listener`. Registering the same listener twice yields two
    /// subscriptions and two calls per change.
    pub fn add_listener(&self, listener: Arc<dyn LocationListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut state = self.write();
        state.listeners.push((id, listener));
        debug!("👂 Listener {:?} registered ({} total)", id, state.listeners.len());
        id
    }

    pub fn remove_listener(&self, id: SubscriptionId) {
        let mut state = self.write();
        if let Some(pos) = state.listeners.iter().position(|(existing, _)| *existing == id) {
            state.listeners.remove(pos);
            debug!("👂 Listener {:?} removed ({} left)", id, state.listeners.len());
        }
    }

    /// Every stored sample, accurate or not.
    pub fn sample_count(&self) -> usize {
        self.read().samples.len()
    }

    pub fn listener_count(&self) -> usize {
        self.read().listeners.len()
    }

    fn snapshot_listeners(state: &StoreState) -> Vec<Arc<dyn LocationListener>> {
        state.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
    }

    // Runs without the lock held so listeners may call back into the store.
    fn publish_change_notifications(listeners: &[Arc<dyn LocationListener>]) {
        for listener in listeners {
            listener.on_location_data_changed();
        }
    }

    // A panicking listener never runs under the lock, and the state is valid
    // after every completed mutation, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
