//! The three user-callback calling conventions and the dispatcher that picks
//! between them.
//!
//! A keyval's `flags` select exactly one of:
//! 1. **Native** -- arguments are passed as live Rust values (the "raw
//!    pointer" case in a real C binding): the host object, the translated
//!    PTR value, and the extra-state word.
//! 2. **Fortran narrow** -- `extra_state` and the attribute value are
//!    FINT-sized (`i32`); only the object's `back_handle` is passed, not the
//!    live object.
//! 3. **Fortran wide** -- like (2), but AINT-sized (`i64`).
//!
//! Callbacks never see the engine's lock: the caller (`ops.rs`) drops the
//! lock before invoking anything in this module and re-acquires it after.
//! Because of that, a callback may legally re-enter any engine operation.

use crate::host::HostObject;
use crate::value::{ValueCell, WriteMode};

/// `extra_state` as supplied to `create_keyval`, tagged by calling
/// convention so the dispatcher knows which width to hand the callback.
#[derive(Clone, Copy)]
pub enum ExtraState {
    Native(usize),
    FortranNarrow(i32),
    FortranWide(i64),
}

type NativeDeleteFn = std::sync::Arc<dyn Fn(&dyn HostObject, i32, usize, usize) -> i32 + Send + Sync>;
type FortranNarrowDeleteFn = std::sync::Arc<dyn Fn(i32, i32, i32, i32) -> i32 + Send + Sync>;
type FortranWideDeleteFn = std::sync::Arc<dyn Fn(i32, i32, i64, i64) -> i32 + Send + Sync>;

type NativeCopyFn = std::sync::Arc<
    dyn Fn(&dyn HostObject, i32, usize, usize, &mut usize, &mut bool, &dyn HostObject) -> i32
        + Send
        + Sync,
>;
type FortranNarrowCopyFn =
    std::sync::Arc<dyn Fn(i32, i32, i32, i32, &mut i32, &mut bool) -> i32 + Send + Sync>;
type FortranWideCopyFn =
    std::sync::Arc<dyn Fn(i32, i32, i64, i64, &mut i64, &mut bool) -> i32 + Send + Sync>;

/// A keyval's delete callback, in whichever convention its flags selected.
#[derive(Clone)]
pub enum DeleteCallback {
    Native(NativeDeleteFn),
    FortranNarrow(FortranNarrowDeleteFn),
    FortranWide(FortranWideDeleteFn),
}

/// A keyval's copy callback, in whichever convention its flags selected.
#[derive(Clone)]
pub enum CopyCallback {
    Native(NativeCopyFn),
    FortranNarrow(FortranNarrowCopyFn),
    FortranWide(FortranWideCopyFn),
}

/// Invoke a delete callback on `cell`, translating it and `extra_state` into
/// the shape the callback's convention expects.
///
/// Returns the callback's raw status code (0 is success, matching `MPI_SUCCESS`).
pub fn invoke_delete(
    cb: &DeleteCallback,
    extra_state: &ExtraState,
    host: &dyn HostObject,
    key: i32,
    cell: &ValueCell,
) -> i32 {
    match (cb, extra_state) {
        (DeleteCallback::Native(f), ExtraState::Native(es)) => {
            f(host, key, cell.read_ptr(), *es)
        }
        (DeleteCallback::FortranNarrow(f), ExtraState::FortranNarrow(es)) => {
            f(host.back_handle(), key, cell.read_fint(), *es)
        }
        (DeleteCallback::FortranWide(f), ExtraState::FortranWide(es)) => {
            f(host.back_handle(), key, cell.read_aint(), *es)
        }
        _ => unreachable!("keyval flags guarantee callback and extra_state conventions match"),
    }
}

/// Invoke a copy callback on `cell`. On success with `flag == true`, returns
/// a freshly constructed [`ValueCell`] holding the copied value, with
/// `write_mode` derived from the calling convention (Native -> Pointer,
/// FortranNarrow -> Fint, FortranWide -> Aint), per spec.md §4.7.
///
/// Returns `(status, Some(cell))` when the callback succeeded and asked for
/// the attribute to be duplicated, `(status, None)` on success-but-skip or
/// on failure.
pub fn invoke_copy(
    cb: &CopyCallback,
    extra_state: &ExtraState,
    old_host: &dyn HostObject,
    new_host: &dyn HostObject,
    key: i32,
    cell: &ValueCell,
) -> (i32, Option<ValueCell>) {
    match (cb, extra_state) {
        (CopyCallback::Native(f), ExtraState::Native(es)) => {
            let mut out: usize = 0;
            let mut flag = false;
            let status = f(old_host, key, *es, cell.read_ptr(), &mut out, &mut flag, new_host);
            if status == 0 && flag {
                (status, Some(ValueCell::from_ptr(out)))
            } else {
                (status, None)
            }
        }
        (CopyCallback::FortranNarrow(f), ExtraState::FortranNarrow(es)) => {
            let mut out: i32 = 0;
            let mut flag = false;
            let status = f(old_host.back_handle(), key, cell.read_fint(), *es, &mut out, &mut flag);
            if status == 0 && flag {
                (status, Some(ValueCell::from_fint(out)))
            } else {
                (status, None)
            }
        }
        (CopyCallback::FortranWide(f), ExtraState::FortranWide(es)) => {
            let mut out: i64 = 0;
            let mut flag = false;
            let status = f(old_host.back_handle(), key, cell.read_aint(), *es, &mut out, &mut flag);
            if status == 0 && flag {
                (status, Some(ValueCell::from_aint(out)))
            } else {
                (status, None)
            }
        }
        _ => unreachable!("keyval flags guarantee callback and extra_state conventions match"),
    }
}
