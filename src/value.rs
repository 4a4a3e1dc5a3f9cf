//! Attribute value storage and the writer/reader translation table.
//!
//! A [`ValueCell`] holds exactly one attribute's stored value. It remembers
//! which width it was written as ([`WriteMode`]) and translates that single
//! stored value into whichever of PTR/INT/FINT/AINT a reader asks for,
//! following the table in the module-level comment below.
//!
//! ```text
//! Writer \ Reader |  ->PTR            |  ->FINT              |  ->AINT
//! ----------------+--------------------+-----------------------+------------------
//! Pointer         |  identity          |  narrow-cast          |  wide-cast
//! Int             |  address of INT    |  cast of stored INT   |  sign-extend INT
//! Fint            |  address of FINT   |  identity             |  sign-extend FINT
//! Aint            |  address of AINT   |  narrow-truncate AINT |  identity
//! ```
//!
//! Rather than aliasing a raw byte buffer and taking sub-word addresses into
//! it (the original's pointer-into-union trick), each cell keeps independent
//! `int_slot`/`fint_slot`/`aint_slot` fields alongside `ptr_word`, populated
//! at construction per `write_mode`. This is the escape hatch spec.md calls
//! out explicitly: it preserves every entry of the table above without a
//! platform-dependent sub-word-addressing probe.

/// How a [`ValueCell`]'s value was originally written. Determines every
/// subsequent read translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// A native pointer-width value (C API).
    Pointer,
    /// A native `int`-width value (internal only, e.g. window attributes).
    Int,
    /// A narrow Fortran integer (`MPI_Fint`).
    Fint,
    /// A wide Fortran address integer (`MPI_Aint`).
    Aint,
}

/// One attribute's stored value, plus everything needed to translate it into
/// any of the four read representations.
///
/// `write_mode` and the populated slot are immutable once constructed;
/// `sequence` is assigned by the engine at insertion time and used to order
/// destruction (see `ops::delete_all`). Replacing a cell means constructing
/// a new one and discarding the old, never mutating in place.
#[derive(Debug, Clone)]
pub struct ValueCell {
    /// The keyval this cell belongs to. Not set until the cell is inserted
    /// by `ops::set`; `-1` (sentinel) before that.
    pub key: i32,
    write_mode: WriteMode,
    /// Monotonic insertion order, assigned by `Subsystem::next_sequence`.
    pub sequence: u64,

    ptr_word: usize,
    int_slot: i32,
    fint_slot: i32,
    aint_slot: i64,
}

impl ValueCell {
    fn raw(write_mode: WriteMode, ptr_word: usize, int_slot: i32, fint_slot: i32, aint_slot: i64) -> Self {
        ValueCell {
            key: -1,
            write_mode,
            sequence: 0,
            ptr_word,
            int_slot,
            fint_slot,
            aint_slot,
        }
    }

    /// Construct a cell from a native pointer-width value (C API write).
    pub fn from_ptr(v: usize) -> Self {
        Self::raw(WriteMode::Pointer, v, 0, 0, 0)
    }

    /// Construct a cell from a native `int` value (internal-only write,
    /// e.g. a window's cached integer attribute).
    pub fn from_int(v: i32) -> Self {
        Self::raw(WriteMode::Int, 0, v, 0, 0)
    }

    /// Construct a cell from a narrow Fortran integer write.
    pub fn from_fint(v: i32) -> Self {
        Self::raw(WriteMode::Fint, 0, 0, v, 0)
    }

    /// Construct a cell from a wide Fortran address-integer write.
    pub fn from_aint(v: i64) -> Self {
        Self::raw(WriteMode::Aint, 0, 0, 0, v)
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Translate this cell's stored value into a native pointer-width word.
    ///
    /// For non-pointer write modes this does not return the stored integer
    /// itself -- it returns the address of the cell's same-type integer
    /// slot, which a native-language reader is expected to dereference. That
    /// slot is guaranteed valid for the cell's lifetime.
    pub fn read_ptr(&self) -> usize {
        match self.write_mode {
            WriteMode::Pointer => self.ptr_word,
            WriteMode::Int => std::ptr::addr_of!(self.int_slot) as usize,
            WriteMode::Fint => std::ptr::addr_of!(self.fint_slot) as usize,
            WriteMode::Aint => std::ptr::addr_of!(self.aint_slot) as usize,
        }
    }

    /// Translate this cell's stored value into a native `int`.
    pub fn read_int(&self) -> i32 {
        match self.write_mode {
            WriteMode::Pointer => self.ptr_word as i32,
            WriteMode::Int => self.int_slot,
            WriteMode::Fint => self.fint_slot,
            WriteMode::Aint => self.aint_slot as i32,
        }
    }

    /// Translate this cell's stored value into a narrow Fortran integer.
    pub fn read_fint(&self) -> i32 {
        match self.write_mode {
            WriteMode::Pointer => self.ptr_word as i32,
            WriteMode::Int => self.int_slot,
            WriteMode::Fint => self.fint_slot,
            WriteMode::Aint => self.aint_slot as i32,
        }
    }

    /// Translate this cell's stored value into a wide Fortran address
    /// integer, sign-extending narrower writes.
    pub fn read_aint(&self) -> i64 {
        match self.write_mode {
            WriteMode::Pointer => self.ptr_word as i64,
            WriteMode::Int => self.int_slot as i64,
            WriteMode::Fint => self.fint_slot as i64,
            WriteMode::Aint => self.aint_slot,
        }
    }
}
