//! Sub-word pointer-offset probing, as performed by `attr_subsys_construct`
//! in the original: scanning a probe word to discover where an `int`-sized
//! and `MPI_Fint`-sized value land inside a pointer-sized union on the
//! current platform's byte order.
//!
//! This engine does not need the answer -- [`crate::value::ValueCell`] keeps
//! independent slots per write mode instead of aliasing one union and taking
//! sub-word addresses into it, which is the alternative spec.md §9
//! explicitly sanctions. `probe_int_offset`/`probe_fint_offset` are kept
//! here, tested, and documented only because a future FFI boundary that
//! *does* need to hand a raw sub-word address to native C code would need
//! exactly this calculation; nothing in `ops`/`callback`/`value` calls them.

/// Byte offset of an `i32` within a `usize`-sized word on this platform,
/// found the same way the original probes it: write a known pattern into a
/// word-sized buffer, then scan for where a narrower read recovers it.
pub fn probe_int_offset() -> usize {
    probe_offset_32()
}

/// Byte offset of an `MPI_Fint`-sized (`i32`) value within a `usize`-sized
/// word. Identical calculation to [`probe_int_offset`] -- kept as a
/// separate entry point because the original treats "C int" and "Fortran
/// INTEGER" as independently-probed offsets even though they are the same
/// width on every platform this engine targets.
pub fn probe_fint_offset() -> usize {
    probe_offset_32()
}

/// Writes `1usize` into a probe word, then scans it for the 4-byte-aligned
/// sub-word offset at which an `i32` read (in the platform's native byte
/// order) would observe that `1` -- exactly `attr_subsys_construct`'s
/// `int_pos`/`integer_pos` computation.
fn probe_offset_32() -> usize {
    let probe: usize = 1;
    let bytes = probe.to_ne_bytes();
    let narrow_bytes = std::mem::size_of::<i32>();
    for start in 0..=(bytes.len() - narrow_bytes) {
        let window: [u8; 4] = bytes[start..start + narrow_bytes].try_into().unwrap();
        if i32::from_ne_bytes(window) == 1 {
            return start;
        }
    }
    unreachable!("a word holding 1 always has a sub-word index observing it")
}
