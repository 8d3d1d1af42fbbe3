//! Registry of live bridge instances.
//!
//! Remote API notifications arrive once per process and are fanned out to
//! every instance. The registry is created by the application and handed to
//! each [`EcBridge`](crate::bridge::EcBridge); it holds weak references only,
//! so dropping a bridge never leaks through the registry.
//!
//! It also owns the process-wide RAS client and mailbox gateway client
//! connection counters: the first client initializes the native component,
//! the last one tears it down. The owner of the process-wide translation
//! callback is recorded here as well.
//!
//! Fan-out works on the snapshot returned by `live()`, not under the registry
//! lock. Handlers may therefore initialize or tear down bridges of the same
//! registry while a notification is delivered. Instances joining or leaving
//! during delivery see the next notification; the RAS cookie claim is a
//! compare-and-swap and needs no registry lock.

use crate::bridge::BridgeShared;
use ecat_common::native::NativeMaster;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct Entry {
    id: u64,
    bridge: Weak<BridgeShared>,
}

/// Live bridge instances plus shared connection counters.
pub struct InstanceRegistry {
    instances: Mutex<Vec<Entry>>,
    ras_native: Mutex<Option<Arc<dyn NativeMaster>>>,
    translation_owner: Mutex<Option<u64>>,
    ras_clients: AtomicU32,
    mbx_gateway_clients: AtomicU32,
    last_instance: AtomicU64,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(Vec::new()),
            ras_native: Mutex::new(None),
            translation_owner: Mutex::new(None),
            ras_clients: AtomicU32::new(0),
            mbx_gateway_clients: AtomicU32::new(0),
            last_instance: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_instance_id(&self) -> u64 {
        self.last_instance.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add an instance; a no-op if it is already present.
    ///
    /// Entries whose bridge has been dropped are pruned.
    pub(crate) fn insert(&self, id: u64, bridge: Weak<BridgeShared>) {
        let mut instances = self.instances.lock();
        instances.retain(|e| e.bridge.strong_count() > 0);
        if !instances.iter().any(|e| e.id == id) {
            instances.push(Entry { id, bridge });
        }
    }

    /// Remove an instance. Returns false if it was not present.
    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut instances = self.instances.lock();
        let before = instances.len();
        instances.retain(|e| e.id != id);
        instances.len() != before
    }

    /// Returns true if the instance with `id` is registered.
    pub fn contains(&self, id: u64) -> bool {
        self.instances.lock().iter().any(|e| e.id == id)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    /// Returns true if no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live instances in registration order.
    ///
    /// Entries whose bridge has been dropped are pruned.
    pub(crate) fn live(&self) -> Vec<Arc<BridgeShared>> {
        let mut instances = self.instances.lock();
        instances.retain(|e| e.bridge.strong_count() > 0);
        instances.iter().filter_map(|e| e.bridge.upgrade()).collect()
    }

    /// Number of instances connected through the RAS client.
    pub fn ras_client_count(&self) -> u32 {
        self.ras_clients.load(Ordering::SeqCst)
    }

    /// Number of instances connected through the mailbox gateway client.
    pub fn mbx_gateway_client_count(&self) -> u32 {
        self.mbx_gateway_clients.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire_ras_client(&self) -> u32 {
        self.ras_clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the remaining count, or `None` if it was already zero.
    pub(crate) fn release_ras_client(&self) -> Option<u32> {
        release(&self.ras_clients)
    }

    pub(crate) fn acquire_mbx_gateway_client(&self) -> u32 {
        self.mbx_gateway_clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the remaining count, or `None` if it was already zero.
    pub(crate) fn release_mbx_gateway_client(&self) -> Option<u32> {
        release(&self.mbx_gateway_clients)
    }

    /// Native library serving the process-wide RAS client.
    pub(crate) fn ras_native(&self) -> Option<Arc<dyn NativeMaster>> {
        self.ras_native.lock().clone()
    }

    pub(crate) fn set_ras_native(&self, native: Option<Arc<dyn NativeMaster>>) {
        *self.ras_native.lock() = native;
    }

    /// Instance whose translation callback is installed.
    ///
    /// Held while the callback is swapped in the native layer.
    pub(crate) fn translation_owner(&self) -> MutexGuard<'_, Option<u64>> {
        self.translation_owner.lock()
    }
}

fn release(counter: &AtomicU32) -> Option<u32> {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
        .ok()
        .map(|prev| prev - 1)
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("instances", &self.len())
            .field("ras_clients", &self.ras_client_count())
            .field("mbx_gateway_clients", &self.mbx_gateway_client_count())
            .finish()
    }
}
