//! Tryte-addressed memory.
//!
//! The console's address space is a flat array of 19,683 trytes, one for
//! every value an address tryte can take: address `---------` (-9841) is
//! the first cell and `+++++++++` (+9841) the last. Because the index
//! space and the address space coincide exactly, a tryte address can never
//! be out of bounds.
//!
//! Stores to watched addresses invoke the registered callbacks inline and
//! in registration order; this is the memory-mapped I/O side channel, and
//! the only way the store is observable from outside.

use crate::ternary::Tryte;
use std::collections::HashMap;
use thiserror::Error;

/// Number of addressable cells (3^9).
pub const MEMORY_SIZE: usize = 19_683;

/// Callback invoked after a store to a watched address, receiving the
/// stored value and the address.
pub type WriteWatcher = Box<dyn FnMut(&Tryte, &Tryte)>;

/// A flat store of 19,683 trytes addressed by signed tryte value.
pub struct Memory {
    cells: Vec<Tryte>,
    watchers: HashMap<i32, Vec<WriteWatcher>>,
}

impl Memory {
    /// Create a memory with every cell zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![Tryte::ZERO; MEMORY_SIZE],
            watchers: HashMap::new(),
        }
    }

    /// Read the cell at the given address.
    ///
    /// The value is cloned out; the caller owns its copy and cannot alias
    /// the backing store.
    pub fn load(&self, address: &Tryte) -> Tryte {
        self.cells[Self::index_of(address)].clone()
    }

    /// Write a value to the given address, then notify any watchers
    /// registered for exactly that address.
    pub fn store(&mut self, value: Tryte, address: &Tryte) {
        let signed = address.to_i32();
        self.cells[Self::index_of(address)] = value;

        if let Some(watchers) = self.watchers.get_mut(&signed) {
            let stored = &self.cells[(signed + Tryte::MAX_VALUE) as usize];
            for watcher in watchers.iter_mut() {
                watcher(stored, address);
            }
        }
    }

    /// Register a callback for stores to one exact address.
    ///
    /// Watchers run synchronously inside [`Memory::store`], in registration
    /// order. A watcher must not re-enter the CPU that owns this memory.
    pub fn watch<F>(&mut self, address: &Tryte, watcher: F)
    where
        F: FnMut(&Tryte, &Tryte) + 'static,
    {
        self.watchers
            .entry(address.to_i32())
            .or_default()
            .push(Box::new(watcher));
    }

    /// Copy an assembled object image into memory, starting at the entry
    /// address (`---------`). Cells past the image keep their contents.
    pub fn load_image(&mut self, image: &[Tryte]) -> Result<(), MemoryError> {
        if image.len() > MEMORY_SIZE {
            return Err(MemoryError::ImageTooLarge {
                size: image.len(),
                capacity: MEMORY_SIZE,
            });
        }

        for (cell, word) in self.cells.iter_mut().zip(image) {
            *cell = word.clone();
        }

        Ok(())
    }

    /// Zero every cell. Watchers stay registered and are not notified.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Tryte::ZERO;
        }
    }

    fn index_of(address: &Tryte) -> usize {
        (address.to_i32() + Tryte::MAX_VALUE) as usize
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|cell| !cell.is_zero()).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .field("watched_addresses", &self.watchers.len())
            .finish()
    }
}

/// Errors from bulk memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("object image of {size} trytes exceeds memory capacity {capacity}")]
    ImageTooLarge { size: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn load_store_roundtrip() {
        let mut mem = Memory::new();
        let addr = Tryte::from_i32(42);

        mem.store(Tryte::from_i32(-1234), &addr);
        assert_eq!(mem.load(&addr).to_i32(), -1234);
    }

    #[test]
    fn extreme_addresses_are_valid() {
        let mut mem = Memory::new();

        mem.store(Tryte::from_i32(1), &Tryte::MIN);
        mem.store(Tryte::from_i32(2), &Tryte::MAX);

        assert_eq!(mem.load(&Tryte::MIN).to_i32(), 1);
        assert_eq!(mem.load(&Tryte::MAX).to_i32(), 2);
        assert_eq!(mem.load(&Tryte::ZERO).to_i32(), 0);
    }

    #[test]
    fn watchers_fire_in_registration_order() {
        let mut mem = Memory::new();
        let addr = Tryte::from_i32(-100);
        let seen: Rc<RefCell<Vec<(i32, i32, i32)>>> = Rc::default();

        for tag in [1, 2] {
            let seen = Rc::clone(&seen);
            mem.watch(&addr, move |value, address| {
                seen.borrow_mut()
                    .push((tag, value.to_i32(), address.to_i32()));
            });
        }

        mem.store(Tryte::from_i32(7), &addr);
        // A store elsewhere does not notify.
        mem.store(Tryte::from_i32(8), &Tryte::from_i32(-99));

        assert_eq!(seen.borrow().as_slice(), &[(1, 7, -100), (2, 7, -100)]);
    }

    #[test]
    fn image_loads_from_entry_address() {
        let mut mem = Memory::new();
        let image = vec![
            Tryte::from_i32(10),
            Tryte::from_i32(20),
            Tryte::from_i32(30),
        ];

        mem.load_image(&image).unwrap();

        assert_eq!(mem.load(&Tryte::MIN).to_i32(), 10);
        assert_eq!(mem.load(&Tryte::from_i32(-9840)).to_i32(), 20);
        assert_eq!(mem.load(&Tryte::from_i32(-9839)).to_i32(), 30);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut mem = Memory::new();
        let image = vec![Tryte::ZERO; MEMORY_SIZE + 1];

        assert_eq!(
            mem.load_image(&image),
            Err(MemoryError::ImageTooLarge {
                size: MEMORY_SIZE + 1,
                capacity: MEMORY_SIZE,
            })
        );
    }
}
