//! Volume catalog - a keyed entity store with change notifications
//!
//! Each entry holds the payload most recently inserted for an id, the
//! timestamp it was inserted at and an enabled flag. Subscribers receive
//! every change as a [`CatalogEvent`] over an unbounded channel.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Change notification sent to catalog subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent<D> {
    Added { id: usize },
    Updated { id: usize, timestamp: f64, data: D },
    Removed { id: usize },
    Enabled { id: usize, enabled: bool },
}

#[derive(Debug, Clone)]
struct Entry<D> {
    data: D,
    timestamp: f64,
    enabled: bool,
}

#[derive(Debug)]
struct CatalogState<D> {
    entries: BTreeMap<usize, Entry<D>>,
    subscribers: Vec<UnboundedSender<CatalogEvent<D>>>,
    current_time: f64,
}

impl<D: Clone> CatalogState<D> {
    fn notify(&mut self, event: CatalogEvent<D>) {
        // Receivers that went away are dropped on the next send
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Thread-safe store of named volumes
#[derive(Debug)]
pub struct VolumeCatalog<D> {
    state: RwLock<CatalogState<D>>,
}

impl<D: Clone> Default for VolumeCatalog<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Clone> VolumeCatalog<D> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState {
                entries: BTreeMap::new(),
                subscribers: Vec::new(),
                current_time: 0.0,
            }),
        }
    }

    /// Store `data` for `id` at `timestamp` and make `timestamp` the current time.
    ///
    /// Inserting the timestamp already stored for `id` is a no-op and returns
    /// `false`. Otherwise the entry is replaced and enabled.
    pub fn insert(&self, id: usize, timestamp: f64, data: D) -> bool {
        let mut state = self.state.write();
        state.current_time = timestamp;

        let is_new = match state.entries.get(&id) {
            Some(entry) if entry.timestamp == timestamp => return false,
            Some(_) => false,
            None => true,
        };

        state.entries.insert(
            id,
            Entry {
                data: data.clone(),
                timestamp,
                enabled: true,
            },
        );
        debug!(id, timestamp, is_new, "catalog entry stored");

        if is_new {
            state.notify(CatalogEvent::Added { id });
        }
        state.notify(CatalogEvent::Updated {
            id,
            timestamp,
            data,
        });
        true
    }

    /// Drop `id`; returns its payload if it was present
    pub fn remove(&self, id: usize) -> Option<D> {
        let mut state = self.state.write();
        let entry = state.entries.remove(&id)?;
        state.notify(CatalogEvent::Removed { id });
        Some(entry.data)
    }

    /// Enable or disable `id`. Returns `true` if the flag changed.
    pub fn set_enabled(&self, id: usize, enabled: bool) -> bool {
        let mut state = self.state.write();
        match state.entries.get_mut(&id) {
            Some(entry) if entry.enabled != enabled => entry.enabled = enabled,
            _ => return false,
        }
        state.notify(CatalogEvent::Enabled { id, enabled });
        true
    }

    pub fn is_enabled(&self, id: usize) -> Option<bool> {
        self.state.read().entries.get(&id).map(|e| e.enabled)
    }

    /// Payload and timestamp stored for `id`
    pub fn get(&self, id: usize) -> Option<(D, f64)> {
        self.state
            .read()
            .entries
            .get(&id)
            .map(|e| (e.data.clone(), e.timestamp))
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<usize> {
        self.state.read().entries.keys().copied().collect()
    }

    /// Ids of enabled entries in ascending order
    pub fn enabled_ids(&self) -> Vec<usize> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Timestamp of the latest insert or explicit time change
    pub fn current_time(&self) -> f64 {
        self.state.read().current_time
    }

    pub fn set_current_time(&self, time: f64) {
        self.state.write().current_time = time;
    }

    /// Register a subscriber. Existing entries are replayed as `Added`
    /// followed by `Updated`.
    pub fn subscribe(&self) -> UnboundedReceiver<CatalogEvent<D>> {
        let (tx, rx) = unbounded_channel();
        let mut state = self.state.write();
        for (&id, entry) in &state.entries {
            let _ = tx.send(CatalogEvent::Added { id });
            let _ = tx.send(CatalogEvent::Updated {
                id,
                timestamp: entry.timestamp,
                data: entry.data.clone(),
            });
        }
        state.subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<D>(rx: &mut UnboundedReceiver<CatalogEvent<D>>) -> Vec<CatalogEvent<D>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_insert_emits_added_then_updated() {
        let catalog = VolumeCatalog::new();
        let mut rx = catalog.subscribe();

        assert!(catalog.insert(7, 0.0, 1u32));
        assert!(catalog.insert(7, 1.0, 2u32));
        assert_eq!(
            drain(&mut rx),
            vec![
                CatalogEvent::Added { id: 7 },
                CatalogEvent::Updated {
                    id: 7,
                    timestamp: 0.0,
                    data: 1
                },
                CatalogEvent::Updated {
                    id: 7,
                    timestamp: 1.0,
                    data: 2
                },
            ]
        );
        assert_eq!(catalog.get(7), Some((2, 1.0)));
    }

    #[test]
    fn test_same_timestamp_is_noop() {
        let catalog = VolumeCatalog::new();
        catalog.insert(1, 5.0, "first");
        let mut rx = catalog.subscribe();
        drain(&mut rx);

        assert!(!catalog.insert(1, 5.0, "second"));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(catalog.get(1), Some(("first", 5.0)));
    }

    #[test]
    fn test_enabled_changes_emit_once() {
        let catalog = VolumeCatalog::new();
        catalog.insert(1, 0.0, ());
        let mut rx = catalog.subscribe();
        drain(&mut rx);

        assert!(!catalog.set_enabled(1, true));
        assert!(catalog.set_enabled(1, false));
        assert!(!catalog.set_enabled(1, false));
        assert!(!catalog.set_enabled(99, false));
        assert_eq!(
            drain(&mut rx),
            vec![CatalogEvent::Enabled {
                id: 1,
                enabled: false
            }]
        );
        assert_eq!(catalog.is_enabled(1), Some(false));
        assert!(catalog.enabled_ids().is_empty());

        // A new insert re-enables the entry
        catalog.insert(1, 1.0, ());
        assert_eq!(catalog.is_enabled(1), Some(true));
    }

    #[test]
    fn test_remove_and_replay() {
        let catalog = VolumeCatalog::new();
        catalog.insert(2, 2.0, 20);
        catalog.insert(1, 1.0, 10);

        let mut rx = catalog.subscribe();
        let replay = drain(&mut rx);
        assert_eq!(replay.len(), 4);
        assert_eq!(replay[0], CatalogEvent::Added { id: 1 });

        assert_eq!(catalog.remove(1), Some(10));
        assert_eq!(catalog.remove(1), None);
        assert_eq!(drain(&mut rx), vec![CatalogEvent::Removed { id: 1 }]);
        assert_eq!(catalog.ids(), vec![2]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let catalog = VolumeCatalog::new();
        let rx = catalog.subscribe();
        drop(rx);
        catalog.insert(1, 0.0, 1);
        catalog.set_current_time(3.5);
        assert_eq!(catalog.current_time(), 3.5);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_insert_advances_current_time() {
        let catalog = VolumeCatalog::new();
        assert_eq!(catalog.current_time(), 0.0);
        catalog.insert(3, 4.0, 'a');
        assert_eq!(catalog.current_time(), 4.0);
        catalog.insert(5, 2.5, 'b');
        assert_eq!(catalog.current_time(), 2.5);

        // A repeated timestamp stores nothing but still moves the clock
        catalog.set_current_time(9.0);
        assert!(!catalog.insert(5, 2.5, 'c'));
        assert_eq!(catalog.current_time(), 2.5);
        assert_eq!(catalog.get(5), Some(('b', 2.5)));
    }
}
