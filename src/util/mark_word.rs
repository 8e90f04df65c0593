//! The mark word is the first word of an object's header. Its low bits encode
//! the object's lock state, and a field above the age bits holds the identity
//! hash code once one has been computed. During evacuation, a forwarding
//! pointer is installed over the mark word; a word that carries lock or hash
//! information therefore has to be saved to a [`PreservedMarkStore`] before it
//! can be overwritten, and restored if the evacuation fails.
//!
//! Bit layout (64-bit):
//!
//! ```text
//!  [ unused | identity hash (32) | age (4) | unused (1) | lock (2) ]
//! ```
//!
//! [`PreservedMarkStore`]: crate::util::preserved_marks::PreservedMarkStore

use crate::util::address::ObjectReference;
use std::fmt;

const LOCK_BITS: usize = 0b11;
const UNLOCKED_VALUE: usize = 0b01;
#[allow(unused)]
const MONITOR_VALUE: usize = 0b10;

const AGE_SHIFT: usize = 3;
const AGE_BITS: usize = 4;
const MAX_AGE: usize = (1 << AGE_BITS) - 1;

const HASH_SHIFT: usize = AGE_SHIFT + AGE_BITS;
const HASH_BITS: usize = 32;
const HASH_MASK: usize = ((1usize << HASH_BITS) - 1) << HASH_SHIFT;
const NO_HASH: usize = 0;

/// A saved or live object header word.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MarkWord(usize);

// The mark word must load/store as a single machine word.
assert_eq_size!(MarkWord, usize);

impl MarkWord {
    /// The header value a freshly allocated object starts with: unlocked, age
    /// zero, no identity hash.
    pub const fn prototype() -> MarkWord {
        MarkWord(UNLOCKED_VALUE)
    }

    /// Reconstruct a mark word from its raw bits.
    pub const fn from_raw(bits: usize) -> MarkWord {
        MarkWord(bits)
    }

    /// The raw bits of this mark word.
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// True if the lock bits say the object is neither stack-locked nor
    /// inflated to a monitor.
    pub fn is_neutral(self) -> bool {
        self.0 & LOCK_BITS == UNLOCKED_VALUE
    }

    /// The identity hash stored in this word, or `NO_HASH` (zero) if none has
    /// been installed.
    pub fn hash(self) -> usize {
        (self.0 & HASH_MASK) >> HASH_SHIFT
    }

    /// True if no identity hash has been installed.
    pub fn has_no_hash(self) -> bool {
        self.hash() == NO_HASH
    }

    /// The object's age in collections survived.
    pub fn age(self) -> usize {
        (self.0 >> AGE_SHIFT) & MAX_AGE
    }

    /// A copy of this word with the given identity hash installed.
    pub fn copy_set_hash(self, hash: usize) -> MarkWord {
        debug_assert!(hash != NO_HASH && hash >> HASH_BITS == 0, "bad hash {:x}", hash);
        MarkWord((self.0 & !HASH_MASK) | (hash << HASH_SHIFT))
    }

    /// A copy of this word with the age bumped by one, saturating at the
    /// maximum representable age.
    pub fn incr_age(self) -> MarkWord {
        let age = usize::min(self.age() + 1, MAX_AGE);
        MarkWord((self.0 & !(MAX_AGE << AGE_SHIFT)) | (age << AGE_SHIFT))
    }

    /// Whether this header would be lost if overwritten by a forwarding
    /// pointer: it is preserved unless it is a neutral header with no
    /// identity hash, which can be recreated from the prototype.
    pub fn must_be_preserved(self) -> bool {
        !self.is_neutral() || !self.has_no_hash()
    }

    /// Read the mark word of an object.
    /// # Safety
    /// The object reference must point to a live object whose first word is
    /// its header.
    pub unsafe fn load(object: ObjectReference) -> MarkWord {
        MarkWord(object.to_raw_address().load::<usize>())
    }

    /// Write this mark word into an object's header.
    /// # Safety
    /// The object reference must point to a live object whose first word is
    /// its header.
    pub unsafe fn store(self, object: ObjectReference) {
        object.to_raw_address().store::<usize>(self.0)
    }
}

impl fmt::Debug for MarkWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MarkWord({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prototype_is_neutral_and_hashless() {
        let m = MarkWord::prototype();
        assert!(m.is_neutral());
        assert!(m.has_no_hash());
        assert!(!m.must_be_preserved());
        assert_eq!(m.age(), 0);
    }

    #[test]
    fn hash_survives_in_word() {
        let m = MarkWord::prototype().copy_set_hash(0xDEAD_BEEF);
        assert!(m.is_neutral());
        assert_eq!(m.hash(), 0xDEAD_BEEF);
        assert!(m.must_be_preserved());
    }

    #[test]
    fn locked_word_must_be_preserved() {
        // Clear the lock bits to fake a stack-locked header (a displaced
        // header pointer is word-aligned, so its low bits are 00).
        let m = MarkWord::from_raw(0x1000);
        assert!(!m.is_neutral());
        assert!(m.must_be_preserved());
    }

    #[test]
    fn age_saturates() {
        let mut m = MarkWord::prototype();
        for _ in 0..20 {
            m = m.incr_age();
        }
        assert_eq!(m.age(), 15);
        assert!(m.is_neutral());
    }

    #[test]
    fn load_store_round_trip() {
        let mut header: usize = MarkWord::prototype().as_raw();
        let obj =
            ObjectReference::from_raw_address(crate::util::Address::from_mut_ptr(&mut header));
        let m = unsafe { MarkWord::load(obj) }.copy_set_hash(0x1234);
        unsafe { m.store(obj) };
        assert_eq!(unsafe { MarkWord::load(obj) }.hash(), 0x1234);
    }
}
