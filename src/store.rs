//! Receipt persistence and the snapshot change feed
use super::error::StoreError;
use super::receipt::Receipt;
use super::utils::new_uuid_to_bech32;
use sled::{Batch, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

const RECEIPT_TREE: &str = "receipts";
const ID_PREFIX: &str = "receipt_";

/// Receives the full receipt set, ordered by number, on every change.
pub type SnapshotListener = Arc<dyn Fn(&[Receipt]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Durable home of the receipt pool.
///
/// Nothing here enforces unique receipt numbers; numbering is the pool
/// manager's job and is advisory under concurrent writers.
pub trait ReceiptStore: Send + Sync {
    /// Every record, ordered by receipt number.
    fn list(&self) -> Result<Vec<Receipt>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Receipt>, StoreError>;

    /// Overwrite the record stored under `receipt.id()`.
    fn put(&self, receipt: &Receipt) -> Result<(), StoreError>;

    /// Store `next` only if the record under its id still equals `previous`.
    /// Returns false, writing nothing, when another writer got there first.
    fn replace(&self, previous: &Receipt, next: &Receipt) -> Result<bool, StoreError>;

    /// Create one unissued receipt per number, all or nothing. Ids are assigned here.
    fn create_batch(&self, numbers: &[u32]) -> Result<Vec<Receipt>, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.list()?.is_empty())
    }

    /// Registers a listener and immediately hands it the current snapshot.
    /// Snapshots reach each listener in commit order. Listeners must not
    /// write to the store they are subscribed to.
    fn subscribe(&self, listener: SnapshotListener) -> Result<SubscriptionId, StoreError>;

    /// Returns false when the id was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

pub struct SledReceiptStore {
    tree: Tree,
    listeners: Mutex<Vec<(SubscriptionId, SnapshotListener)>>,
    next_subscription: AtomicU64,
    // held from snapshot read to last delivery
    publishing: Mutex<()>,
}

impl SledReceiptStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        let tree = instance.open_tree(RECEIPT_TREE)?;

        Ok(Self {
            tree,
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
            publishing: Mutex::new(()),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    fn listeners(&self) -> Vec<SnapshotListener> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    // called after a committed write; a failed re-read only costs subscribers one update
    fn notify(&self) {
        let _publishing = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        let listeners = self.listeners();
        if listeners.is_empty() {
            return;
        }

        match self.list() {
            Ok(snapshot) => {
                debug!(
                    listeners = listeners.len(),
                    receipts = snapshot.len(),
                    "publishing receipt snapshot"
                );
                for listener in listeners {
                    listener(&snapshot);
                }
            }
            Err(err) => warn!(error = %err, "could not read snapshot for subscribers"),
        }
    }
}

impl ReceiptStore for SledReceiptStore {
    fn list(&self) -> Result<Vec<Receipt>, StoreError> {
        let mut receipts = self
            .tree
            .iter()
            .values()
            .map(|value| -> Result<Receipt, StoreError> {
                let bytes = value?;
                Ok(minicbor::decode(&bytes)?)
            })
            .collect::<Result<Vec<_>, _>>()?;

        receipts.sort_by(|a, b| a.number().cmp(&b.number()).then_with(|| a.id().cmp(b.id())));
        debug!(receipts = receipts.len(), "listed receipts");

        Ok(receipts)
    }

    fn get(&self, id: &str) -> Result<Option<Receipt>, StoreError> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, receipt: &Receipt) -> Result<(), StoreError> {
        self.tree
            .insert(receipt.id().as_bytes(), minicbor::to_vec(receipt)?)?;
        self.notify();
        Ok(())
    }

    fn replace(&self, previous: &Receipt, next: &Receipt) -> Result<bool, StoreError> {
        let key = next.id().as_bytes();
        let encoded = minicbor::to_vec(next)?;

        loop {
            let current = self.tree.get(key)?;
            let unchanged = match &current {
                Some(bytes) => minicbor::decode::<Receipt>(bytes)? == *previous,
                None => false,
            };
            if !unchanged {
                debug!(receipt = next.number(), "stale replace refused");
                return Ok(false);
            }

            // a failed swap means a write landed after the read, so check again
            if self
                .tree
                .compare_and_swap(key, current, Some(encoded.clone()))?
                .is_ok()
            {
                self.notify();
                return Ok(true);
            }
        }
    }

    fn create_batch(&self, numbers: &[u32]) -> Result<Vec<Receipt>, StoreError> {
        let mut batch = Batch::default();
        let mut created = Vec::with_capacity(numbers.len());

        for &number in numbers {
            let receipt = Receipt::unissued(new_uuid_to_bech32(ID_PREFIX)?, number);
            batch.insert(receipt.id().as_bytes(), minicbor::to_vec(&receipt)?);
            created.push(receipt);
        }

        self.tree.apply_batch(batch)?;
        self.notify();

        Ok(created)
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.tree.is_empty())
    }

    fn subscribe(&self, listener: SnapshotListener) -> Result<SubscriptionId, StoreError> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let _publishing = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.list()?;

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&listener)));
        listener(&snapshot);

        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);

        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::TimeStamp;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn temporary_store() -> SledReceiptStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledReceiptStore::new(Arc::new(db)).unwrap()
    }

    #[test]
    fn batch_is_listed_in_number_order() {
        let store = temporary_store();
        store.create_batch(&[3, 1, 2]).unwrap();

        let numbers: Vec<u32> = store.list().unwrap().iter().map(Receipt::number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let store = temporary_store();
        let created = store.create_batch(&[1, 2]).unwrap();

        assert!(created[0].id().starts_with("receipt_1"));
        assert_ne!(created[0].id(), created[1].id());
        assert_eq!(store.get(created[1].id()).unwrap().as_ref(), Some(&created[1]));
        assert!(store.get("receipt_missing").unwrap().is_none());
    }

    #[test]
    fn subscribers_get_full_snapshots() {
        let store = temporary_store();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = store
            .subscribe(Arc::new(move |snapshot: &[Receipt]| {
                sink.lock().unwrap().push(snapshot.len());
            }))
            .unwrap();

        store.create_batch(&[1, 2]).unwrap();
        store.create_batch(&[3]).unwrap();
        assert!(store.unsubscribe(id));
        store.create_batch(&[4]).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 2, 3]);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn put_overwrites_by_id() {
        let store = temporary_store();
        let mut receipt = store.create_batch(&[4]).unwrap().remove(0);
        receipt
            .issue("Meera Iyer", "XII-A", "Priya", TimeStamp::new())
            .unwrap();

        store.put(&receipt).unwrap();
        assert_eq!(store.get(receipt.id()).unwrap(), Some(receipt));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn replace_refuses_stale_records() {
        let store = temporary_store();
        let loaded = store.create_batch(&[1]).unwrap().remove(0);

        let mut first = loaded.clone();
        first
            .issue("Rohan Gupta", "XII-C", "Kabir", TimeStamp::new())
            .unwrap();
        assert!(store.replace(&loaded, &first).unwrap());

        let mut second = loaded.clone();
        second
            .issue("Asha Rao", "XII-B", "Priya", TimeStamp::new())
            .unwrap();
        assert!(!store.replace(&loaded, &second).unwrap());

        let stored = store.get(loaded.id()).unwrap().unwrap();
        assert_eq!(stored.student_name(), Some("Rohan Gupta"));
    }

    /// A slow listener must not let an older snapshot land after a newer one.
    #[test]
    fn concurrent_writers_publish_in_commit_order() {
        let store = Arc::new(temporary_store());
        let last_seen = Arc::new(Mutex::new(0usize));
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);

        let parked = Arc::new(AtomicBool::new(false));

        let sink = Arc::clone(&last_seen);
        let parking = Arc::clone(&parked);
        store
            .subscribe(Arc::new(move |snapshot: &[Receipt]| {
                // hold the first writer's delivery before it lands
                if snapshot.len() == 1 {
                    parking.store(true, Ordering::SeqCst);
                    gate.lock().unwrap().recv().unwrap();
                }
                *sink.lock().unwrap() = snapshot.len();
            }))
            .unwrap();

        let first = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.create_batch(&[1]).unwrap())
        };
        while !parked.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        let second = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.create_batch(&[2]).unwrap())
        };
        while store.list().unwrap().len() != 2 {
            thread::sleep(Duration::from_millis(1));
        }

        release.send(()).unwrap();
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(*last_seen.lock().unwrap(), 2);
    }

    #[test]
    fn subscribing_sees_the_current_pool() {
        let store = temporary_store();
        store.create_batch(&[1, 2, 3]).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        store
            .subscribe(Arc::new(move |snapshot: &[Receipt]| {
                sink.lock().unwrap().push(snapshot.len());
            }))
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
