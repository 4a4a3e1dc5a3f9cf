//! Status codes returned by the attribute engine.
//!
//! Every public operation returns `Result<T, Status>`. The engine never logs
//! an error on the caller's behalf (see `ops.rs`); it only ever returns one.

use thiserror::Error;

/// Status surfaced by an attribute-engine operation.
///
/// `Callback` carries a user callback's non-success return verbatim -- the
/// engine does not interpret or remap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Status {
    #[error("success")]
    Success,

    /// The key bitmap is exhausted, or a descriptor/cell allocation failed.
    #[error("out of resource")]
    OutOfResource,

    /// Wrong host_kind, Predefined without allow_predefined, missing keyval,
    /// or a null attribute map where one was required.
    #[error("bad parameter")]
    BadParam,

    /// `copy_all` was called on an INSTANCE host (instance attributes are
    /// not duplicable).
    #[error("invalid argument")]
    Arg,

    /// Internal inconsistency: e.g. an iterator held a key the registry no
    /// longer has a descriptor for. Indicates an engine bug, not caller error.
    #[error("internal error")]
    Intern,

    /// `get` was called with a key the registry has no descriptor for.
    #[error("invalid key")]
    InvalidKey,

    /// A user copy/delete callback returned a non-success status; the
    /// operation in progress aborted and this is that status, unchanged.
    #[error("callback returned status {0}")]
    Callback(i32),
}

impl Status {
    /// True for `Status::Success` only.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

pub type Result<T> = std::result::Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_recognized() {
        assert!(Status::Success.is_success());
        assert!(!Status::BadParam.is_success());
    }

    #[test]
    fn callback_status_roundtrips_the_code() {
        let s = Status::Callback(-7);
        match s {
            Status::Callback(code) => assert_eq!(code, -7),
            _ => panic!("expected Callback variant"),
        }
    }
}
