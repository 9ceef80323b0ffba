//! Host exceptions.
//!
//! A host operation that throws returns [`Thrown`] carrying the thrown
//! value. Exceptions are ordinary values of the host, not Rust errors: the
//! boundary decides whether to report them to module code or treat them as
//! fatal.

use crate::value::HostValue;

/// A thrown host value.
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown(pub HostValue);

impl Thrown {
    pub fn value(&self) -> &HostValue {
        &self.0
    }

    pub fn into_value(self) -> HostValue {
        self.0
    }
}

/// Result of a host operation: a value or a thrown exception.
pub type Completion<T> = Result<T, Thrown>;
