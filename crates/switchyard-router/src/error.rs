//! Router construction errors.

use thiserror::Error;

/// Errors raised while building a [`PrefixRouter`](crate::PrefixRouter).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A binding was declared with an empty prefix, which would match every path.
    #[error("route binding #{index} has an empty prefix; use the fallback handler instead")]
    EmptyPrefix {
        /// Position of the offending binding in declaration order.
        index: usize,
    },
}
