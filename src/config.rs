//! Runtime-tunable limits for the attribute engine.
//!
//! Parsed once from the environment at subsystem construction, in the same
//! style as a `SEQ_REPORT`/`SEQ_STRAND_REGISTRY_SIZE`-style env-gated config:
//! unset means "use the spec default", and a malformed value is a warning,
//! not a hard failure.

use std::sync::OnceLock;

/// The platform's Fortran handle bound (`INT_MAX` on every platform this
/// crate targets). Keys above this are unrepresentable in `MPI_Fint`.
pub const PLATFORM_MAX_KEY: i32 = i32::MAX;

/// `TAG_UB, HOST, IO, WTIME_IS_GLOBAL, APPNUM, LASTUSEDCODE,
/// UNIVERSE_SIZE, WIN_BASE, WIN_SIZE, WIN_DISP_UNIT, WIN_CREATE_FLAVOR,
/// WIN_MODEL` -- the MPI-defined predefined attribute keys.
pub const MODEL_KEY: i32 = 11;

/// Engine-wide tunables, resolved once and cached for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound (inclusive) for non-predefined key allocation. Defaults
    /// to [`PLATFORM_MAX_KEY`]; shrunk via `OMPI_ATTR_MAX_KEY` so tests can
    /// exhaust the bitmap without allocating a platform-sized one.
    pub max_key: i32,
    /// Whether `trace!`-level instrumentation is emitted for lock
    /// acquisition, callback dispatch, and destruction ordering.
    pub trace_enabled: bool,
}

impl EngineConfig {
    fn from_env() -> Self {
        let max_key = std::env::var("OMPI_ATTR_MAX_KEY")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|&v| v > MODEL_KEY)
            .unwrap_or(PLATFORM_MAX_KEY);

        let trace_enabled = match std::env::var("OMPI_ATTR_TRACE").as_deref() {
            Ok("1") => true,
            Ok("0") | Err(_) => false,
            Ok(other) => {
                eprintln!("Warning: OMPI_ATTR_TRACE='{other}' not recognized, ignoring");
                false
            }
        };

        EngineConfig {
            max_key,
            trace_enabled,
        }
    }
}

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// The process-wide engine configuration, parsed from the environment on
/// first access and cached thereafter.
pub fn engine_config() -> &'static EngineConfig {
    CONFIG.get_or_init(EngineConfig::from_env)
}
