//! Minimal stand-in for the process-wide instance retain/release counter.
//!
//! spec.md names this counter an external collaborator, owned by the host
//! runtime (mirrors `ompi_mpi_instance_retain`/`ompi_mpi_instance_release`,
//! which pin the whole MPI runtime instance alive, not just this engine's
//! subsystem). No such runtime exists in this crate, so this module provides
//! the narrowest possible substitute -- a process-wide atomic counter --
//! purely so `create_keyval`/`free_keyval` have something real to call,
//! exactly as `host.rs`'s `TestHost` stands in for the host objects
//! themselves without attempting to model their full behavior.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::Result;

static REFS: OnceLock<AtomicU64> = OnceLock::new();

fn refs() -> &'static AtomicU64 {
    REFS.get_or_init(|| AtomicU64::new(0))
}

/// Pins the runtime instance alive for as long as at least one user keyval
/// exists. `create_keyval` calls this once per successful allocation; per
/// spec.md §4.2, a failed allocation must release it again before returning.
pub fn retain() -> Result<()> {
    refs().fetch_add(1, Ordering::SeqCst);
    Ok(())
}

/// Balances one `retain`. `free_keyval` calls this once per call, per
/// spec.md §4.2 ("balances with a process instance release").
pub fn release() {
    let prev = refs().fetch_sub(1, Ordering::SeqCst);
    debug_assert!(prev >= 1, "instance release without a matching retain");
}

/// The current outstanding retain count. Exposed for tests only.
pub fn ref_count() -> u64 {
    refs().load(Ordering::SeqCst)
}
