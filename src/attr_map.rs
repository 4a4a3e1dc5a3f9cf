//! Per-object attribute map: key -> [`ValueCell`], owned by one host object.

use crate::value::ValueCell;
use std::collections::HashMap;

/// A host object's attribute storage. Absent (the `Option` around this type
/// in `HostObject::attr_slot`) is the default state; an empty-but-present
/// map is equivalent for reads but distinct for `ops::set`'s "allocate on
/// first write" step.
#[derive(Debug, Default)]
pub struct AttributeMap {
    cells: HashMap<i32, ValueCell>,
}

impl AttributeMap {
    pub fn new() -> Self {
        AttributeMap {
            cells: HashMap::new(),
        }
    }

    pub fn get(&self, key: i32) -> Option<&ValueCell> {
        self.cells.get(&key)
    }

    pub fn insert(&mut self, key: i32, cell: ValueCell) -> Option<ValueCell> {
        self.cells.insert(key, cell)
    }

    pub fn remove(&mut self, key: i32) -> Option<ValueCell> {
        self.cells.remove(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// A snapshot of every `(key, cell)` pair currently stored, in
    /// unspecified order. Used by `ops::delete_all` (which imposes its own
    /// sequence-descending order on the snapshot) and `ops::copy_all`
    /// (which makes no ordering promise).
    pub fn snapshot(&self) -> Vec<(i32, ValueCell)> {
        self.cells
            .iter()
            .map(|(&k, v)| (k, v.clone()))
            .collect()
    }
}
