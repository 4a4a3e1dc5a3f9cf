//! The five public operations this engine provides: create/free a keyval,
//! and set/get/delete/copy-all/delete-all attributes on a host object.
//!
//! Every operation here that can reach a user callback drops the target
//! host's attribute-map lock before the call and re-acquires it after,
//! mirroring attribute.c's unlock-call-relock discipline around
//! `DELETE_ATTR_CALLBACKS`/`COPY_ATTR_CALLBACKS`. That is what lets a
//! delete callback legally turn around and delete a different attribute on
//! the same object without deadlocking against itself.

use tracing::trace;

use crate::attr_map::AttributeMap;
use crate::callback::{invoke_copy, invoke_delete, CopyCallback, DeleteCallback, ExtraState};
use crate::config::engine_config;
use crate::error::{Result, Status};
use crate::host::{HostKind, HostObject};
use crate::instance;
use crate::keyval::{KeyvalDescriptor, KeyvalFlags};
use crate::subsystem::subsystem;
use crate::value::ValueCell;

/// Emits a `trace!` event only when `OMPI_ATTR_TRACE=1`, independent of
/// whatever filter the embedding host's own `tracing` subscriber applies.
macro_rules! engine_trace {
    ($($arg:tt)*) => {
        if engine_config().trace_enabled {
            trace!($($arg)*);
        }
    };
}

/// Registers a new keyval for `host_kind`, returning its freshly allocated
/// integer key. Fails with [`Status::OutOfResource`] once the key space is
/// exhausted. `bindings_extra` is an opaque owned value a bindings layer may
/// attach to the descriptor; it is dropped automatically when the
/// descriptor is destroyed, with no separate free step required.
///
/// Per spec.md §4.2, a successful allocation pins the runtime's process
/// instance alive for as long as this keyval exists (mirrors
/// `ompi_mpi_instance_retain` in `ompi_attr_create_keyval`); a failed
/// allocation releases that pin again before returning, since no keyval was
/// actually created to hold it.
pub fn create_keyval(
    host_kind: HostKind,
    flags: KeyvalFlags,
    copy_cb: CopyCallback,
    delete_cb: DeleteCallback,
    extra_state: ExtraState,
    bindings_extra: Option<Box<dyn std::any::Any + Send + Sync>>,
) -> Result<i32> {
    instance::retain()?;
    let key = subsystem().register_keyval(|key| {
        KeyvalDescriptor::new(key, host_kind, flags, copy_cb, delete_cb, extra_state, bindings_extra)
    });
    match key {
        Ok(key) => {
            engine_trace!(key, ?host_kind, "keyval created");
            Ok(key)
        }
        Err(status) => {
            instance::release();
            Err(status)
        }
    }
}

/// Releases the registry's own reference to `key`, immediately invalidating
/// it for future `set`/`get` calls (mirrors attribute.c resetting the
/// caller's key handle to `MPI_KEYVAL_INVALID`). Attribute cells already
/// stored under this key elsewhere keep the underlying descriptor alive --
/// and its delete callback reachable via `delete` -- until they are
/// themselves removed.
///
/// `allow_predefined` mirrors `set`'s parameter of the same name: ordinary
/// callers must pass `false` and get `BadParam` back for any of the twelve
/// reserved keys; only the runtime teardown path that retires predefined
/// attributes at subsystem shutdown passes `true`.
///
/// Per spec.md §4.2/§7, an absent descriptor or a `host_kind` mismatch is a
/// contract violation (`BadParam`), not `InvalidKey` -- `InvalidKey` is
/// reserved for `get`'s "this key is gone from the caller's perspective"
/// case.
///
/// Balances the process instance pin `create_keyval` took (spec.md §4.2,
/// "balances with a process instance release"; `ompi_attr_free_keyval`'s
/// trailing `ompi_mpi_instance_release()`).
pub fn free_keyval(key: i32, host_kind: HostKind, allow_predefined: bool) -> Result<()> {
    let sub = subsystem();
    let (actual_kind, is_predefined) = sub
        .with_keyval(key, |kv| (kv.host_kind, kv.is_predefined()))
        .ok_or(Status::BadParam)?;
    if actual_kind != host_kind {
        return Err(Status::BadParam);
    }
    if is_predefined && !allow_predefined {
        return Err(Status::BadParam);
    }
    sub.with_keyval_mut(key, |kv| kv.mark_freed());
    sub.release_keyval(key);
    instance::release();
    engine_trace!(key, "keyval freed");
    Ok(())
}

/// Runs `key`'s delete callback on `cell`. By the time any caller in this
/// module reaches this, `key`'s presence in the registry has already been
/// validated -- a missing descriptor here means invariant 1 (a live cell
/// always has a live descriptor) has been violated, which is an internal
/// bug, not a caller error.
fn run_delete(host: &dyn HostObject, key: i32, cell: &ValueCell) -> Result<i32> {
    let (delete_cb, extra_state) = subsystem()
        .with_keyval(key, |kv| (kv.delete_cb.clone(), kv.extra_state))
        .ok_or(Status::Intern)?;
    Ok(invoke_delete(&delete_cb, &extra_state, host, key, cell))
}

/// Stores `value` under `key` on `host`, running the existing attribute's
/// delete callback first if one is present. `allow_predefined` bypasses the
/// ordinary rejection of writes to a predefined keyval; only `copy_all`
/// passes `true`, mirroring `set_value`'s `predefined` parameter in
/// attribute.c.
pub fn set(host: &dyn HostObject, key: i32, value: ValueCell, allow_predefined: bool) -> Result<()> {
    let sub = subsystem();
    let (host_kind, is_predefined, is_freed) = sub
        .with_keyval(key, |kv| (kv.host_kind, kv.is_predefined(), kv.is_freed()))
        .ok_or(Status::BadParam)?;
    if host_kind != host.host_kind() {
        return Err(Status::BadParam);
    }
    if is_freed {
        return Err(Status::InvalidKey);
    }
    if is_predefined && !allow_predefined {
        return Err(Status::BadParam);
    }

    let old_cell = {
        let mut slot = host.attr_slot().lock().unwrap();
        if slot.is_none() {
            *slot = Some(AttributeMap::new());
        }
        slot.as_ref().unwrap().get(key).cloned()
    };

    let had_old = match old_cell {
        Some(old_cell) => {
            let status = run_delete(host, key, &old_cell)?;
            if status != 0 {
                return Err(Status::Callback(status));
            }
            let mut slot = host.attr_slot().lock().unwrap();
            slot.as_mut().unwrap().remove(key);
            drop(slot);
            // The removed cell's implicit keyval reference transfers
            // directly to the new cell below -- no release/retain cycle,
            // matching set_value's OBJ_RETAIN(keyval) only if !had_old.
            true
        }
        None => false,
    };

    // The delete callback above ran with the registry lock dropped, so it
    // may have reentrantly freed this very keyval out from under us (e.g.
    // by driving its refcount to zero via free_keyval). Re-verify it is
    // still registered before publishing a new cell under it -- mirrors
    // set_value's second keyval lookup in attribute.c, performed right
    // after DELETE_ATTR_CALLBACKS returns, which treats a vanished keyval
    // as an internal inconsistency rather than proceeding.
    if sub.with_keyval(key, |_| ()).is_none() {
        return Err(Status::Intern);
    }

    let mut cell = value;
    cell.key = key;
    cell.sequence = sub.next_sequence();

    let mut slot = host.attr_slot().lock().unwrap();
    slot.as_mut().unwrap().insert(key, cell);
    drop(slot);

    if !had_old {
        sub.retain_keyval(key);
    }
    engine_trace!(key, had_old, "attribute set");
    Ok(())
}

/// Reads the attribute stored under `key` on `host`. Returns `Ok(None)`
/// when `key` is valid for this host kind but nothing has been set yet
/// (the original's `flag == 0` case); returns `Err(Status::InvalidKey)` when
/// `key` itself does not exist, or has already been passed to
/// `free_keyval` -- a freed key is conceptually gone from the caller even
/// while a live attribute cell keeps its descriptor around internally.
pub fn get(host: &dyn HostObject, key: i32) -> Result<Option<ValueCell>> {
    let (host_kind, is_freed) = subsystem()
        .with_keyval(key, |kv| (kv.host_kind, kv.is_freed()))
        .ok_or(Status::InvalidKey)?;
    if host_kind != host.host_kind() || is_freed {
        return Err(Status::InvalidKey);
    }
    let slot = host.attr_slot().lock().unwrap();
    Ok(slot.as_ref().and_then(|m| m.get(key).cloned()))
}

/// Removes the attribute stored under `key` on `host`, running its delete
/// callback. A non-zero callback status aborts the delete, leaving the
/// attribute and the keyval's refcount untouched.
///
/// Per spec.md §4.6, if `key` is valid in the registry but has no cell on
/// this host, the call still succeeds and drops one reference on the
/// descriptor without invoking any callback -- there is nothing to delete,
/// but the caller's implicit claim on the keyval is still released.
pub fn delete(host: &dyn HostObject, key: i32, allow_predefined: bool) -> Result<()> {
    let sub = subsystem();
    let (host_kind, is_predefined) = sub
        .with_keyval(key, |kv| (kv.host_kind, kv.is_predefined()))
        .ok_or(Status::BadParam)?;
    if host_kind != host.host_kind() {
        return Err(Status::BadParam);
    }
    if is_predefined && !allow_predefined {
        return Err(Status::BadParam);
    }

    let cell = {
        let slot = host.attr_slot().lock().unwrap();
        slot.as_ref().and_then(|m| m.get(key).cloned())
    };

    if let Some(cell) = cell {
        let status = run_delete(host, key, &cell)?;
        if status != 0 {
            return Err(Status::Callback(status));
        }
        let mut slot = host.attr_slot().lock().unwrap();
        slot.as_mut().unwrap().remove(key);
        drop(slot);
    }
    sub.release_keyval(key);
    engine_trace!(key, "attribute deleted");
    Ok(())
}

/// Removes every attribute on `host`, newest-first by insertion sequence.
/// Stops at the first callback failure without rolling back attributes
/// already removed, matching attribute.c's `ompi_attr_delete_all`.
pub fn delete_all(host: &dyn HostObject) -> Result<()> {
    let mut cells = {
        let slot = host.attr_slot().lock().unwrap();
        match slot.as_ref() {
            Some(m) => m.snapshot(),
            None => return Ok(()),
        }
    };
    cells.sort_by(|a, b| b.1.sequence.cmp(&a.1.sequence));

    for (key, cell) in cells {
        let status = run_delete(host, key, &cell)?;
        if status != 0 {
            return Err(Status::Callback(status));
        }
        let mut slot = host.attr_slot().lock().unwrap();
        if let Some(m) = slot.as_mut() {
            m.remove(key);
        }
        drop(slot);
        subsystem().release_keyval(key);
    }
    engine_trace!(kind = ?host.host_kind(), "all attributes deleted");
    Ok(())
}

/// Copies every attribute from `old_host` onto `new_host` by invoking each
/// keyval's copy callback. Instance-kind hosts are rejected outright, since
/// process instances are never duplicated (attribute.c's
/// `ompi_attr_copy_all` rejects `INSTANCE_ATTR` the same way).
pub fn copy_all(old_host: &dyn HostObject, new_host: &dyn HostObject) -> Result<()> {
    if old_host.host_kind() == HostKind::Instance {
        return Err(Status::Arg);
    }

    let cells = {
        let slot = old_host.attr_slot().lock().unwrap();
        match slot.as_ref() {
            Some(m) => m.snapshot(),
            None => return Ok(()),
        }
    };

    for (key, cell) in cells {
        let (copy_cb, extra_state, is_predefined) = subsystem()
            .with_keyval(key, |kv| (kv.copy_cb.clone(), kv.extra_state, kv.is_predefined()))
            .ok_or(Status::Intern)?;

        let (status, new_cell) = invoke_copy(&copy_cb, &extra_state, old_host, new_host, key, &cell);
        if status != 0 {
            return Err(Status::Callback(status));
        }
        if let Some(new_cell) = new_cell {
            set(new_host, key, new_cell, is_predefined)?;
        }
    }
    engine_trace!("attributes copied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TestHost;
    use crate::value::WriteMode;
    use serial_test::serial;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn noop_keyval(host_kind: HostKind) -> i32 {
        create_keyval(
            host_kind,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| 0)),
            ExtraState::Native(0),
            None,
        )
        .unwrap()
    }

    #[test]
    #[serial]
    fn set_then_get_round_trips_the_value() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = noop_keyval(HostKind::Communicator);
        set(&host, key, ValueCell::from_ptr(0xABCD), false).unwrap();
        let cell = get(&host, key).unwrap().unwrap();
        assert_eq!(cell.read_ptr(), 0xABCD);
    }

    #[test]
    #[serial]
    fn get_on_unset_key_returns_no_attribute() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = noop_keyval(HostKind::Communicator);
        assert!(get(&host, key).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn get_with_mismatched_host_kind_is_invalid() {
        let host = TestHost::new(HostKind::Window, 1);
        let key = noop_keyval(HostKind::Communicator);
        assert!(matches!(get(&host, key), Err(Status::InvalidKey)));
    }

    #[test]
    #[serial]
    fn predefined_keyval_rejects_ordinary_set() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::PREDEFINED,
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| 0)),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        assert!(matches!(
            set(&host, key, ValueCell::from_ptr(1), false),
            Err(Status::BadParam)
        ));
        assert!(set(&host, key, ValueCell::from_ptr(1), true).is_ok());
    }

    #[test]
    #[serial]
    fn delete_invokes_callback_and_drops_the_cell() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let called = Arc::new(AtomicI32::new(0));
        let called2 = called.clone();
        let key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(move |_h, _k, _v, _es| {
                called2.fetch_add(1, Ordering::SeqCst);
                0
            })),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        set(&host, key, ValueCell::from_ptr(1), false).unwrap();
        delete(&host, key, false).unwrap();
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert!(get(&host, key).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn failing_delete_callback_leaves_the_attribute_in_place() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| -1)),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        set(&host, key, ValueCell::from_ptr(7), false).unwrap();
        let before = subsystem().with_keyval(key, |kv| kv.refcount()).unwrap();
        let err = delete(&host, key, false).unwrap_err();
        assert!(matches!(err, Status::Callback(-1)));
        assert_eq!(get(&host, key).unwrap().unwrap().read_ptr(), 7);
        let after = subsystem().with_keyval(key, |kv| kv.refcount()).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    #[serial]
    fn delete_all_runs_newest_key_first() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut keys = Vec::new();
        for _ in 0..3 {
            let order2 = order.clone();
            let key = create_keyval(
                HostKind::Communicator,
                KeyvalFlags::empty(),
                CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
                DeleteCallback::Native(Arc::new(move |_h, k, _v, _es| {
                    order2.lock().unwrap().push(k);
                    0
                })),
                ExtraState::Native(0),
                None,
            )
            .unwrap();
            set(&host, key, ValueCell::from_ptr(1), false).unwrap();
            keys.push(key);
        }
        delete_all(&host).unwrap();
        let observed = order.lock().unwrap().clone();
        let mut expected = keys.clone();
        expected.reverse();
        assert_eq!(observed, expected);
    }

    #[test]
    #[serial]
    fn delete_callback_may_reenter_and_delete_a_different_attribute() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let victim_key = Arc::new(AtomicI32::new(-1));
        let victim_key2 = victim_key.clone();

        let inert_key = noop_keyval(HostKind::Communicator);
        set(&host, inert_key, ValueCell::from_ptr(1), false).unwrap();
        victim_key.store(inert_key, Ordering::SeqCst);

        let reenter_key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(move |h: &dyn HostObject, _k, _v, _es| {
                let victim = victim_key2.load(Ordering::SeqCst);
                delete(h, victim, false).expect("reentrant delete must not deadlock");
                0
            })),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        set(&host, reenter_key, ValueCell::from_ptr(2), false).unwrap();

        delete(&host, reenter_key, false).unwrap();
        assert!(get(&host, inert_key).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn copy_all_duplicates_flagged_attributes_onto_the_new_host() {
        let old_host = TestHost::new(HostKind::Communicator, 1);
        let new_host = TestHost::new(HostKind::Communicator, 2);
        let key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, in_val, out, flag, _n| {
                *out = in_val;
                *flag = true;
                0
            })),
            DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| 0)),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        set(&old_host, key, ValueCell::from_ptr(55), false).unwrap();
        copy_all(&old_host, &new_host).unwrap();
        let copied = get(&new_host, key).unwrap().unwrap();
        assert_eq!(copied.read_ptr(), 55);
        assert_eq!(copied.write_mode(), WriteMode::Pointer);
    }

    #[test]
    #[serial]
    fn copy_all_rejects_instance_hosts() {
        let old_host = TestHost::new(HostKind::Instance, 1);
        let new_host = TestHost::new(HostKind::Instance, 2);
        assert!(matches!(copy_all(&old_host, &new_host), Err(Status::Arg)));
    }

    #[test]
    #[serial]
    fn keyval_descriptor_outlives_free_until_last_cell_is_deleted() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = noop_keyval(HostKind::Communicator);
        set(&host, key, ValueCell::from_ptr(1), false).unwrap();
        free_keyval(key, HostKind::Communicator, false).unwrap();
        // The key is immediately invalid from the caller's perspective...
        assert!(matches!(get(&host, key), Err(Status::InvalidKey)));
        // ...but the descriptor is still alive underneath, so tearing down
        // the one remaining cell still runs the delete callback cleanly.
        delete(&host, key, false).unwrap();
    }

    #[test]
    #[serial]
    fn delete_on_a_valid_key_with_no_cell_just_drops_a_reference() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = noop_keyval(HostKind::Communicator);
        let before = subsystem().with_keyval(key, |kv| kv.refcount()).unwrap();
        // Nothing was ever set on this host under `key` -- the registry
        // entry is valid, but this host's map has no cell for it.
        delete(&host, key, false).unwrap();
        let after = subsystem().with_keyval(key, |kv| kv.refcount()).unwrap();
        assert_eq!(after, before - 1);
    }

    #[test]
    #[serial]
    fn delete_on_an_unknown_key_is_a_bad_param() {
        let host = TestHost::new(HostKind::Communicator, 1);
        assert!(matches!(delete(&host, 999_999, false), Err(Status::BadParam)));
    }

    #[test]
    #[serial]
    fn free_keyval_on_an_unknown_key_is_a_bad_param() {
        assert!(matches!(
            free_keyval(999_999, HostKind::Communicator, false),
            Err(Status::BadParam)
        ));
    }

    #[test]
    #[serial]
    fn free_keyval_with_wrong_host_kind_is_a_bad_param() {
        let key = noop_keyval(HostKind::Communicator);
        assert!(matches!(
            free_keyval(key, HostKind::Window, false),
            Err(Status::BadParam)
        ));
    }

    #[test]
    #[serial]
    fn create_keyval_pins_and_free_keyval_releases_the_instance() {
        let before = crate::instance::ref_count();
        let key = noop_keyval(HostKind::Communicator);
        assert_eq!(crate::instance::ref_count(), before + 1);
        free_keyval(key, HostKind::Communicator, false).unwrap();
        assert_eq!(crate::instance::ref_count(), before);
    }

    #[test]
    #[serial]
    fn create_keyval_releases_the_instance_pin_on_a_failed_allocation() {
        let before = crate::instance::ref_count();
        // Shrink the reserved range to nothing left to allocate by
        // exhausting every non-predefined key up front.
        let mut keys = Vec::new();
        loop {
            match create_keyval(
                HostKind::Communicator,
                KeyvalFlags::empty(),
                CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
                DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| 0)),
                ExtraState::Native(0),
                None,
            ) {
                Ok(key) => keys.push(key),
                Err(Status::OutOfResource) => break,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        let pinned_after_exhaustion = crate::instance::ref_count();
        assert_eq!(pinned_after_exhaustion, before + keys.len() as u64);
        assert!(matches!(
            create_keyval(
                HostKind::Communicator,
                KeyvalFlags::empty(),
                CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
                DeleteCallback::Native(Arc::new(|_h, _k, _v, _es| 0)),
                ExtraState::Native(0),
                None,
            ),
            Err(Status::OutOfResource)
        ));
        // The failed attempt's pin must not linger.
        assert_eq!(crate::instance::ref_count(), pinned_after_exhaustion);
        for key in keys {
            free_keyval(key, HostKind::Communicator, false).unwrap();
        }
        assert_eq!(crate::instance::ref_count(), before);
    }

    #[test]
    #[serial]
    fn set_detects_a_keyval_freed_from_under_it_by_a_reentrant_delete_callback() {
        let host = TestHost::new(HostKind::Communicator, 1);
        let key = create_keyval(
            HostKind::Communicator,
            KeyvalFlags::empty(),
            CopyCallback::Native(Arc::new(|_o, _k, _es, _in, _out, _flag, _n| 0)),
            DeleteCallback::Native(Arc::new(|_h, k, _v, _es| {
                // Drains every remaining reference on this keyval from
                // underneath the in-flight `set` call: the registry's own
                // reference, plus the one still held by the cell being
                // replaced (not yet removed from the host's map at this
                // point in `set`), fully destroying the descriptor.
                free_keyval(k, HostKind::Communicator, false).unwrap();
                free_keyval(k, HostKind::Communicator, false).unwrap();
                0
            })),
            ExtraState::Native(0),
            None,
        )
        .unwrap();
        set(&host, key, ValueCell::from_ptr(1), false).unwrap();
        let err = set(&host, key, ValueCell::from_ptr(2), false).unwrap_err();
        assert!(matches!(err, Status::Intern));
    }
}
