use std::collections::HashMap;

use super::ir::Address;

/// How a name's slots are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// One word, read with `push`. Array parameters hold a pointer here.
    Scalar,
    /// Contiguous elements; the base pointer comes from `ptrto`.
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub address: Address,
    pub storage: Storage,
}

/// Name to slot map for one segment. Slots are handed out in declaration
/// order from 0.
#[derive(Debug)]
pub struct AddressTable {
    make: fn(u32) -> Address,
    next: u32,
    entries: HashMap<String, Slot>,
}

impl AddressTable {
    pub fn globals() -> Self {
        Self::with_segment(Address::Global)
    }

    pub fn locals() -> Self {
        Self::with_segment(Address::Local)
    }

    fn with_segment(make: fn(u32) -> Address) -> Self {
        Self {
            make,
            next: 0,
            entries: HashMap::new(),
        }
    }

    /// Reserve one scalar slot.
    pub fn allocate(&mut self, name: &str) -> Address {
        self.reserve(name, 1, Storage::Scalar)
    }

    /// Reserve `len` contiguous slots; `name` maps to the first.
    pub fn allocate_array(&mut self, name: &str, len: usize) -> Address {
        self.reserve(name, len as u32, Storage::Array)
    }

    fn reserve(&mut self, name: &str, count: u32, storage: Storage) -> Address {
        let address = (self.make)(self.next);
        self.next += count;
        self.entries.insert(name.to_string(), Slot { address, storage });
        address
    }

    pub fn get(&self, name: &str) -> Option<Slot> {
        self.entries.get(name).copied()
    }

    /// Slots allocated so far.
    pub fn slots(&self) -> usize {
        self.next as usize
    }
}
