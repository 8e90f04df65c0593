//! Preservation of object headers across evacuation failure.
//!
//! While objects are being evacuated, their mark words are overwritten by
//! forwarding pointers. A header that carries lock or identity-hash state
//! cannot be recreated from the prototype, so it is pushed onto a
//! [`PreservedMarkStore`] first. If the evacuation fails and the object stays
//! where it is, `restore` writes every saved header back.
//!
//! Each GC worker owns one store, collected in a [`PreservedMarkSets`]. An
//! object is forwarded by exactly one worker, so the per-worker stores target
//! disjoint objects and restoration can run in parallel without locking.

use crate::util::address::ObjectReference;
use crate::util::mark_word::MarkWord;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An append-only stack of (object, saved header) pairs, scoped to one
/// evacuating pause.
#[derive(Default)]
pub struct PreservedMarkStore {
    stack: Vec<(ObjectReference, MarkWord)>,
}

impl PreservedMarkStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether this header has to be saved before a forwarding pointer may
    /// overwrite it. Pure predicate, no side effects.
    pub fn should_preserve_mark(_object: ObjectReference, mark: MarkWord) -> bool {
        mark.must_be_preserved()
    }

    /// Save a header. The caller must have checked
    /// [`should_preserve_mark`](Self::should_preserve_mark); pushing a
    /// reconstructible header is a collector bug.
    pub fn push(&mut self, object: ObjectReference, mark: MarkWord) {
        assert!(
            Self::should_preserve_mark(object, mark),
            "preserving a reconstructible mark {:?} for {}",
            mark,
            object
        );
        self.stack.push((object, mark));
    }

    /// Save the header only if it cannot be reconstructed.
    pub fn push_if_necessary(&mut self, object: ObjectReference, mark: MarkWord) {
        if Self::should_preserve_mark(object, mark) {
            self.stack.push((object, mark));
        }
    }

    /// Drain the store, writing every saved header back into its object.
    /// Returns the number of headers restored. A second call on the now-empty
    /// store is a no-op.
    ///
    /// # Safety contract
    /// Every pushed object reference must still point to a live object at its
    /// original location (the definition of evacuation failure).
    pub fn restore(&mut self) -> usize {
        let restored = self.stack.len();
        for (object, mark) in self.stack.drain(..) {
            #[cfg(feature = "extreme_assertions")]
            assert!(mark.must_be_preserved());
            unsafe { mark.store(object) };
        }
        self.assert_empty();
        restored
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Verify the store has been drained. Entries left behind would leak
    /// headers that belong to live objects.
    pub fn assert_empty(&self) {
        assert!(
            self.stack.is_empty(),
            "preserved mark store still holds {} entries",
            self.stack.len()
        );
    }
}

/// One preserved mark store per GC worker, restored together at the end of a
/// failed evacuation.
pub struct PreservedMarkSets {
    stores: Vec<PreservedMarkStore>,
}

impl PreservedMarkSets {
    pub fn new(num_workers: usize) -> Self {
        let mut stores = Vec::with_capacity(num_workers);
        stores.resize_with(num_workers, PreservedMarkStore::new);
        Self { stores }
    }

    pub fn num_stores(&self) -> usize {
        self.stores.len()
    }

    /// The store owned by one worker.
    pub fn get_mut(&mut self, ordinal: usize) -> &mut PreservedMarkStore {
        &mut self.stores[ordinal]
    }

    /// Restore every partition sequentially. Returns the total number of
    /// headers restored.
    pub fn restore(&mut self) -> usize {
        let mut total = 0;
        for store in self.stores.iter_mut() {
            total += store.restore();
        }
        debug!("Restored {} preserved marks", total);
        total
    }

    /// Restore the partitions in parallel, one scoped thread per non-empty
    /// store. The partitions target disjoint objects, so no locking is
    /// needed, only independent iteration. The total matches what sequential
    /// restoration would report.
    pub fn restore_parallel(&mut self) -> usize {
        let total = AtomicUsize::new(0);
        crossbeam::scope(|scope| {
            for store in self.stores.iter_mut().filter(|s| !s.is_empty()) {
                let total = &total;
                scope.spawn(move |_| {
                    total.fetch_add(store.restore(), Ordering::Relaxed);
                });
            }
        })
        .expect("a preserved mark restore thread panicked");
        let total = total.load(Ordering::Relaxed);
        debug!("Restored {} preserved marks (parallel)", total);
        self.assert_empty();
        total
    }

    pub fn assert_empty(&self) {
        for store in &self.stores {
            store.assert_empty();
        }
    }
}

// The stores only ever hold plain words; moving one to a restore thread is fine.
assert_impl_all!(PreservedMarkStore: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::address::Address;

    fn object_at(word: &mut usize) -> ObjectReference {
        ObjectReference::from_raw_address(Address::from_mut_ptr(word))
    }

    #[test]
    fn round_trip_restores_every_header() {
        let hashed = MarkWord::prototype().copy_set_hash(0xABCD);
        let locked = MarkWord::from_raw(0x2000);
        let mut word_a = 0usize;
        let mut word_b = 0usize;
        let obj_a = object_at(&mut word_a);
        let obj_b = object_at(&mut word_b);

        let mut store = PreservedMarkStore::new();
        store.push(obj_a, hashed);
        store.push(obj_b, locked);
        assert_eq!(store.len(), 2);

        assert_eq!(store.restore(), 2);
        assert_eq!(unsafe { MarkWord::load(obj_a) }, hashed);
        assert_eq!(unsafe { MarkWord::load(obj_b) }, locked);

        // Restoring the now-empty store is a no-op.
        assert_eq!(store.restore(), 0);
        store.assert_empty();
    }

    #[test]
    fn push_if_necessary_skips_prototype_headers() {
        let mut word = 0usize;
        let obj = object_at(&mut word);
        let mut store = PreservedMarkStore::new();
        store.push_if_necessary(obj, MarkWord::prototype());
        assert!(store.is_empty());
        store.push_if_necessary(obj, MarkWord::prototype().copy_set_hash(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    #[should_panic]
    fn push_asserts_preservation_predicate() {
        let mut word = 0usize;
        let obj = object_at(&mut word);
        let mut store = PreservedMarkStore::new();
        store.push(obj, MarkWord::prototype());
    }

    #[test]
    fn parallel_restore_matches_sequential_total() {
        const WORKERS: usize = 4;
        const PER_WORKER: usize = 100;
        let mut words = vec![0usize; WORKERS * PER_WORKER];
        let mut sets = PreservedMarkSets::new(WORKERS);
        for (i, word) in words.iter_mut().enumerate() {
            let obj = object_at(word);
            let mark = MarkWord::prototype().copy_set_hash(i + 1);
            sets.get_mut(i % WORKERS).push(obj, mark);
        }

        assert_eq!(sets.restore_parallel(), WORKERS * PER_WORKER);
        sets.assert_empty();
        for (i, word) in words.iter().enumerate() {
            assert_eq!(MarkWord::from_raw(*word).hash(), i + 1);
        }
    }
}
