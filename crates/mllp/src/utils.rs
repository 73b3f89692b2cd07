//! Utility macros used internally by the MLLP crate.

/// Returns early with an error if a condition is not met.
///
/// Like `assert!`, but returns the error instead of panicking.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
