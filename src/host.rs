//! The narrow surface this engine requires from a host object.
//!
//! Communicators, datatypes, windows, and process instances are out of
//! scope for this crate (spec.md §1 lists them as external collaborators):
//! the engine only ever needs an object's kind tag, its Fortran-callable
//! back-reference handle, and exclusive access to its attribute map slot.
//! [`HostObject`] is that surface; nothing about a real communicator's
//! group membership, a window's exposed memory, or an instance's session
//! belongs here.

use crate::attr_map::AttributeMap;
use std::sync::Mutex;

/// Which family of MPI handle an attribute operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Communicator,
    Datatype,
    Window,
    Instance,
}

/// The minimal contract a host object must satisfy to participate in
/// attribute caching.
pub trait HostObject {
    /// Which kind of handle this object is, for keyval/descriptor matching.
    fn host_kind(&self) -> HostKind;

    /// The Fortran-callable integer handle passed to Fortran-convention
    /// callbacks. Opaque to the engine -- it never interprets this value.
    fn back_handle(&self) -> i32;

    /// Exclusive access to this object's attribute map slot. `None` until
    /// the first attribute is set on this object.
    fn attr_slot(&self) -> &Mutex<Option<AttributeMap>>;
}

#[cfg(test)]
pub(crate) struct TestHost {
    kind: HostKind,
    back_handle: i32,
    slot: Mutex<Option<AttributeMap>>,
}

#[cfg(test)]
impl TestHost {
    pub(crate) fn new(kind: HostKind, back_handle: i32) -> Self {
        TestHost {
            kind,
            back_handle,
            slot: Mutex::new(None),
        }
    }
}

#[cfg(test)]
impl HostObject for TestHost {
    fn host_kind(&self) -> HostKind {
        self.kind
    }

    fn back_handle(&self) -> i32 {
        self.back_handle
    }

    fn attr_slot(&self) -> &Mutex<Option<AttributeMap>> {
        &self.slot
    }
}
