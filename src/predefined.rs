//! The twelve MPI-defined predefined attribute keys and the keyval
//! descriptors the subsystem registers for them at construction.
//!
//! Mirrors the real keyvals `MPI_Init` creates for `MPI_TAG_UB`,
//! `MPI_HOST`, etc. before any user code can call `create_keyval` --
//! that ordering is exactly why keys `0..=MODEL_KEY` are pre-marked in
//! the bitmap (subsystem.rs) and then registered here with a
//! caller-supplied key rather than through the ordinary
//! find-first-unset-bit path (spec.md's `create_keyval` notes:
//! "Predefined keyvals receive a caller-supplied key that must already
//! be in the reserved range").

use std::sync::Arc;

use crate::callback::{CopyCallback, DeleteCallback, ExtraState};
use crate::host::HostKind;
use crate::keyval::{KeyvalDescriptor, KeyvalFlags};

pub const TAG_UB: i32 = 0;
pub const HOST: i32 = 1;
pub const IO: i32 = 2;
pub const WTIME_IS_GLOBAL: i32 = 3;
pub const APPNUM: i32 = 4;
pub const LASTUSEDCODE: i32 = 5;
pub const UNIVERSE_SIZE: i32 = 6;
pub const WIN_BASE: i32 = 7;
pub const WIN_SIZE: i32 = 8;
pub const WIN_DISP_UNIT: i32 = 9;
pub const WIN_CREATE_FLAVOR: i32 = 10;
pub const WIN_MODEL: i32 = 11;

/// `(key, host_kind)` for every predefined keyval, in registration order.
/// `WIN_MODEL` is last, matching `MODEL_KEY` being its value.
const ENTRIES: [(i32, HostKind); 12] = [
    (TAG_UB, HostKind::Communicator),
    (HOST, HostKind::Communicator),
    (IO, HostKind::Communicator),
    (WTIME_IS_GLOBAL, HostKind::Communicator),
    (APPNUM, HostKind::Communicator),
    (LASTUSEDCODE, HostKind::Communicator),
    (UNIVERSE_SIZE, HostKind::Communicator),
    (WIN_BASE, HostKind::Window),
    (WIN_SIZE, HostKind::Window),
    (WIN_DISP_UNIT, HostKind::Window),
    (WIN_CREATE_FLAVOR, HostKind::Window),
    (WIN_MODEL, HostKind::Window),
];

/// Builds the descriptor for one predefined keyval. Uses the MPI
/// `NULL_COPY_FN`/`NULL_DELETE_FN` convention -- copy reports `flag =
/// false` (nothing propagates across `copy_all` by default) and delete
/// is a no-op -- since the values these keys carry are owned and
/// maintained by the runtime that calls `set`, not by this engine.
fn descriptor(key: i32, host_kind: HostKind) -> KeyvalDescriptor {
    KeyvalDescriptor::new(
        key,
        host_kind,
        KeyvalFlags::PREDEFINED,
        CopyCallback::Native(Arc::new(|_obj, _key, _es, _in, _out, flag, _new_obj| {
            *flag = false;
            0
        })),
        DeleteCallback::Native(Arc::new(|_host, _key, _value, _es| 0)),
        ExtraState::Native(0),
        None,
    )
}

/// Every predefined keyval descriptor, ready to hand to
/// `Subsystem::register_predefined`.
pub(crate) fn all() -> impl Iterator<Item = (i32, KeyvalDescriptor)> {
    ENTRIES
        .into_iter()
        .map(|(key, host_kind)| (key, descriptor(key, host_kind)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_is_within_the_reserved_range() {
        for (key, _) in ENTRIES {
            assert!((0..=WIN_MODEL).contains(&key));
        }
    }

    #[test]
    fn win_model_is_the_last_reserved_key() {
        assert_eq!(WIN_MODEL, crate::config::MODEL_KEY);
    }

    #[test]
    fn all_twelve_keys_are_distinct() {
        let mut keys: Vec<i32> = ENTRIES.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), ENTRIES.len());
    }
}
