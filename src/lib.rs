//! Process-wide attribute caching for MPI-style handle objects.
//!
//! A user registers a **keyval** once (`ops::create_keyval`), describing how
//! its attribute values are duplicated and torn down, then attaches values
//! under that key to any number of host objects of the matching kind
//! (communicators, datatypes, windows, or process instances) via
//! [`ops::set`]. Values written through one representation -- a native
//! pointer, a C `int`, a narrow Fortran integer, or a wide Fortran address
//! integer -- translate correctly no matter which representation a later
//! reader asks for; see [`value`] for the full table.
//!
//! ```text
//! host.rs      -- the HostObject trait a communicator/datatype/window/instance implements
//! value.rs     -- ValueCell and the PTR/INT/FINT/AINT translation table
//! bitmap.rs    -- KeyBitmap, the integer-key allocator
//! attr_map.rs  -- AttributeMap, one host object's key -> ValueCell storage
//! keyval.rs    -- KeyvalDescriptor, the registered keyval and its refcount
//! callback.rs  -- the three callback calling conventions and their dispatcher
//! subsystem.rs -- Subsystem, the process-wide keyval registry singleton
//! instance.rs  -- stand-in for the process-wide instance retain/release counter
//! predefined.rs -- the twelve MPI-defined predefined attribute keys
//! ops.rs       -- create_keyval/free_keyval/set/get/delete/delete_all/copy_all
//! platform.rs  -- sub-word offset probing, retained but not load-bearing
//! config.rs    -- environment-driven tunables
//! error.rs     -- the Status result type
//! ```

pub mod attr_map;
pub mod bitmap;
pub mod callback;
pub mod config;
pub mod error;
pub mod host;
pub mod instance;
pub mod keyval;
pub mod ops;
pub mod platform;
pub mod predefined;
pub mod subsystem;
pub mod value;

pub use callback::{CopyCallback, DeleteCallback, ExtraState};
pub use error::{Result, Status};
pub use host::{HostKind, HostObject};
pub use keyval::KeyvalFlags;
pub use ops::{copy_all, create_keyval, delete, delete_all, free_keyval, get, set};
pub use subsystem::{get_ref, put_ref};
pub use value::{ValueCell, WriteMode};
