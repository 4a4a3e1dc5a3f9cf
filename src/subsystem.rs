//! The process-wide keyval registry and its lazily-constructed singleton.
//!
//! Mirrors `attr_subsys_t` from attribute.c: one `keyval_hash` keyed by
//! integer key, one bitmap allocating those keys, and a monotonic sequence
//! counter used to order attribute destruction. The backing `Subsystem`
//! struct itself is held alive for the whole process by a `OnceLock` (no
//! Rust equivalent of `OBJ_NEW`/`OBJ_RELEASE` destroying and reallocating the
//! struct), but its *logical* lifecycle -- construct on first `get_ref`,
//! tear down predefined attributes and the registry on the matching
//! `put_ref` -- is tracked explicitly via `refs`/`construct_state`/
//! `destruct_state`, mirroring `ompi_attr_get_ref`/`ompi_attr_put_ref`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::bitmap::KeyBitmap;
use crate::config::{engine_config, MODEL_KEY};
use crate::error::{Result, Status};
use crate::keyval::KeyvalDescriptor;
use crate::predefined;

/// Every predefined key the engine pre-reserves at startup, matching the
/// original's bit-marking of `0..=MPI_WIN_MODEL` before any user keyval can
/// be allocated in that range.
const PRE_RESERVED_KEYS: std::ops::RangeInclusive<i32> = 0..=MODEL_KEY;

pub struct Subsystem {
    keyvals: Mutex<HashMap<i32, KeyvalDescriptor>>,
    key_bitmap: Mutex<KeyBitmap>,
    next_sequence: std::sync::atomic::AtomicU64,
    /// Outstanding `get_ref`/`put_ref` count, independent of the `OnceLock`
    /// that actually holds this struct alive for the process's lifetime.
    refs: Mutex<u64>,
}

static SUBSYSTEM: OnceLock<Subsystem> = OnceLock::new();

/// Returns the process-wide subsystem, constructing it on first call.
pub fn subsystem() -> &'static Subsystem {
    SUBSYSTEM.get_or_init(Subsystem::new)
}

/// Retains the subsystem, mirroring `ompi_attr_get_ref`. The very first call
/// (process-wide) constructs it via the lazy `OnceLock`; a call after the
/// ref count has been driven back to zero by `put_ref` reconstructs the key
/// bitmap and predefined keyvals from scratch, same as `attr_subsys_construct`
/// running again on a fresh `attr_subsys_t`. Every other call just retains.
pub fn get_ref() -> Result<()> {
    let sub = subsystem();
    let mut refs = sub.refs.lock().unwrap();
    if *refs == 0 {
        sub.construct_state();
    }
    *refs += 1;
    Ok(())
}

/// Releases one reference taken by `get_ref`. On the last release, tears
/// down every predefined attribute and clears the registry and key bitmap,
/// mirroring `attr_subsys_destruct`'s `ompi_attr_free_predefined` plus
/// releasing the hash table and bitmap.
pub fn put_ref() -> Result<()> {
    let sub = subsystem();
    let mut refs = sub.refs.lock().unwrap();
    debug_assert!(*refs > 0, "put_ref without a matching get_ref");
    *refs = refs.saturating_sub(1);
    if *refs == 0 {
        sub.destruct_state();
    }
    Ok(())
}

impl Subsystem {
    fn new() -> Self {
        let sub = Subsystem {
            keyvals: Mutex::new(HashMap::new()),
            key_bitmap: Mutex::new(KeyBitmap::new(engine_config().max_key)),
            next_sequence: std::sync::atomic::AtomicU64::new(0),
            refs: Mutex::new(0),
        };
        sub.construct_state();
        sub
    }

    /// (Re)initializes the key bitmap's pre-reserved range and registers
    /// every predefined keyval, as `attr_subsys_construct` does. Safe to
    /// call more than once: it always starts from an empty registry/bitmap.
    fn construct_state(&self) {
        let mut bitmap = self.key_bitmap.lock().unwrap();
        *bitmap = KeyBitmap::new(engine_config().max_key);
        for key in PRE_RESERVED_KEYS {
            bitmap.set_bit(key);
        }
        drop(bitmap);
        self.keyvals.lock().unwrap().clear();
        for (key, descriptor) in predefined::all() {
            self.register_predefined(key, descriptor);
        }
    }

    /// Frees every predefined attribute and clears the registry and key
    /// bitmap, as `attr_subsys_destruct` does on the subsystem's last
    /// release. A later `get_ref` reconstructs from scratch.
    fn destruct_state(&self) {
        self.keyvals.lock().unwrap().clear();
        *self.key_bitmap.lock().unwrap() = KeyBitmap::new(engine_config().max_key);
    }

    /// Assigns the next monotonic sequence number, used to stamp newly
    /// inserted attribute cells for `ops::delete_all`'s ordering.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    /// Allocates a fresh key and inserts `descriptor` under it, returning the
    /// assigned key. Fails with [`Status::OutOfResource`] once the bitmap is
    /// exhausted (mirrors `CREATE_KEY`'s `opal_bitmap_find_and_set_first_unset_bit`
    /// failure path).
    pub fn register_keyval(
        &self,
        make_descriptor: impl FnOnce(i32) -> KeyvalDescriptor,
    ) -> Result<i32> {
        let mut bitmap = self.key_bitmap.lock().unwrap();
        let key = bitmap
            .find_and_set_first_unset_bit()
            .ok_or(Status::OutOfResource)?;
        drop(bitmap);
        let descriptor = make_descriptor(key);
        self.keyvals.lock().unwrap().insert(key, descriptor);
        Ok(key)
    }

    /// Inserts a predefined keyval at a caller-chosen, already-reserved key
    /// (used only by the subsystem's own bootstrap, never by user code).
    pub fn register_predefined(&self, key: i32, descriptor: KeyvalDescriptor) {
        self.keyvals.lock().unwrap().insert(key, descriptor);
    }

    pub fn with_keyval<R>(&self, key: i32, f: impl FnOnce(&KeyvalDescriptor) -> R) -> Option<R> {
        self.keyvals.lock().unwrap().get(&key).map(f)
    }

    pub fn with_keyval_mut<R>(
        &self,
        key: i32,
        f: impl FnOnce(&mut KeyvalDescriptor) -> R,
    ) -> Option<R> {
        self.keyvals.lock().unwrap().get_mut(&key).map(f)
    }

    /// Drops one reference from the keyval at `key`. If that was the last
    /// reference, removes the descriptor and returns its integer key to the
    /// bitmap pool.
    pub fn release_keyval(&self, key: i32) {
        let should_remove = self
            .keyvals
            .lock()
            .unwrap()
            .get_mut(&key)
            .map(|kv| kv.release())
            .unwrap_or(false);
        if should_remove {
            self.keyvals.lock().unwrap().remove(&key);
            self.key_bitmap.lock().unwrap().clear_bit(key);
        }
    }

    pub fn retain_keyval(&self, key: i32) {
        if let Some(kv) = self.keyvals.lock().unwrap().get_mut(&key) {
            kv.retain();
        }
    }

    #[cfg(test)]
    fn ref_count(&self) -> u64 {
        *self.refs.lock().unwrap()
    }
}
