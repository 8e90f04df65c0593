//! Utilities used by the coordination subsystem and its collaborators.

pub mod address;
pub mod logger;
pub mod mark_word;
pub mod options;
pub mod preserved_marks;
pub mod vtime;

pub use self::address::Address;
pub use self::address::ObjectReference;
