//! Keyval descriptors: the registry entries created by `create_keyval` and
//! referenced by every attribute cell stored under their key.
//!
//! Mirrors `ompi_attribute_keyval_t` from attribute.c: a keyval outlives the
//! call that created it for as long as any live attribute cell points at it,
//! which is why it is reference counted independently of the registry that
//! owns its canonical copy.

use bitflags::bitflags;

use crate::callback::{CopyCallback, DeleteCallback, ExtraState};
use crate::host::HostKind;

bitflags! {
    /// Per-keyval flags. `Predefined` keys cannot be freed or overwritten by
    /// ordinary `set`/`free_keyval` calls; `Fortran`/`FortranNarrow` select
    /// which of the three callback calling conventions this keyval's
    /// callbacks use (narrow implies Fortran; the two bits are never both
    /// clear and Fortran-wide together).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyvalFlags: u32 {
        const PREDEFINED      = 0b0000_0001;
        const FORTRAN         = 0b0000_0010;
        const FORTRAN_NARROW  = 0b0000_0100;
    }
}

/// A registered keyval: its identity, the host kind it may be attached to,
/// its callback pair, and its opaque extra state.
///
/// `refcount` tracks live references: one for the registry's own entry (held
/// until `free_keyval` is called), plus one for every attribute cell
/// currently stored under this key across every host object. The descriptor
/// is removed from the registry the moment the count reaches zero.
pub struct KeyvalDescriptor {
    pub key: i32,
    pub host_kind: HostKind,
    pub flags: KeyvalFlags,
    pub copy_cb: CopyCallback,
    pub delete_cb: DeleteCallback,
    pub extra_state: ExtraState,
    /// Owned opaque state attached by a bindings layer (e.g. a language
    /// wrapper needing to free a boxed closure when this descriptor dies).
    /// Dropped automatically when the descriptor is removed from the
    /// registry -- no explicit free path is needed, unlike attribute.c's
    /// `bindings_extra`, which the destructor frees by hand.
    bindings_extra: Option<Box<dyn std::any::Any + Send + Sync>>,
    refcount: u32,
    /// Set by `free_keyval`. The MPI caller's own key handle is reset to
    /// `MPI_KEYVAL_INVALID` at that point (attribute.c, `*key =
    /// MPI_KEYVAL_INVALID`), so the key is conceptually gone from the user
    /// even though the descriptor itself may still be kept alive by a live
    /// attribute cell. `set`/`get` treat a freed key as though it were never
    /// registered; `delete` does not, since tearing down the last referring
    /// cell is exactly what must still work after `free_keyval`.
    freed: bool,
}

impl KeyvalDescriptor {
    pub fn new(
        key: i32,
        host_kind: HostKind,
        flags: KeyvalFlags,
        copy_cb: CopyCallback,
        delete_cb: DeleteCallback,
        extra_state: ExtraState,
        bindings_extra: Option<Box<dyn std::any::Any + Send + Sync>>,
    ) -> Self {
        KeyvalDescriptor {
            key,
            host_kind,
            flags,
            copy_cb,
            delete_cb,
            extra_state,
            bindings_extra,
            refcount: 1,
            freed: false,
        }
    }

    /// Borrows the bindings-layer extra state attached at creation, if any.
    pub fn bindings_extra(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        self.bindings_extra.as_deref()
    }

    pub fn is_predefined(&self) -> bool {
        self.flags.contains(KeyvalFlags::PREDEFINED)
    }

    pub fn is_freed(&self) -> bool {
        self.freed
    }

    /// Marks this keyval as freed from the user's perspective. Idempotent:
    /// `free_keyval` can only be called once per key (subsequent calls fail
    /// lookup with `BadParam` before reaching this), but the flag itself
    /// does not need to guard against repeated sets.
    pub fn mark_freed(&mut self) {
        self.freed = true;
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Adds one reference, taken whenever a new attribute cell is stored
    /// under this key.
    pub fn retain(&mut self) {
        self.refcount += 1;
    }

    /// Drops one reference, returning `true` once it reaches zero -- the
    /// caller must then remove this descriptor from the registry.
    pub fn release(&mut self) -> bool {
        debug_assert!(self.refcount > 0);
        self.refcount -= 1;
        self.refcount == 0
    }
}
