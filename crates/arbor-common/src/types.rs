//! Record identifiers and key type tags for Arbor indexes.

use serde::{Deserialize, Serialize};

/// Identifier for a record in the source relation.
///
/// A record identifier is a (page, slot) pair locating a record inside the
/// relation the index was built over. The index stores these alongside keys
/// in its leaf nodes and hands them back from range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page number within the relation file.
    pub page_num: u32,
    /// Slot number within the page.
    pub slot_num: u16,
}

impl RecordId {
    /// Creates a new RecordId.
    pub fn new(page_num: u32, slot_num: u16) -> Self {
        Self { page_num, slot_num }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_num, self.slot_num)
    }
}

/// Tag identifying the type of the indexed attribute.
///
/// Stored in the index meta page so a reopen can verify the index was built
/// over the same attribute it is being asked to serve. Only 32-bit signed
/// integer keys are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    /// 32-bit signed integer key.
    Int32 = 1,
}

impl KeyType {
    /// Returns the fixed byte size of a key of this type.
    pub fn key_size(&self) -> usize {
        match self {
            KeyType::Int32 => 4,
        }
    }

    /// Returns the on-disk tag byte.
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Decodes an on-disk tag byte, or None for an unknown tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(KeyType::Int32),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyType::Int32 => "INT32",
        };
        write!(f, "{}", name)
    }
}
