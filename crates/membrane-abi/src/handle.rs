use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque index of a host value, as seen by module code.
///
/// The first [`Handle::RESERVED`] indices are fixed sentinels and are never
/// handed out by the handle table nor reclaimed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u32);

impl Handle {
    /// `null`, also used for "absent" results.
    pub const NULL: Self = Self(0);
    pub const UNDEFINED: Self = Self(1);
    pub const TRUE: Self = Self(2);
    pub const FALSE: Self = Self(3);

    /// Number of reserved sentinel slots.
    pub const RESERVED: u32 = 4;

    /// Sentinel handle for a boolean.
    pub const fn from_bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Reinterpret a wasm `i32` argument as a handle.
    pub const fn from_abi(raw: i32) -> Self {
        Self(raw as u32)
    }

    /// The wasm `i32` encoding of this handle.
    pub const fn to_abi(self) -> i32 {
        self.0 as i32
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this handle is one of the fixed sentinels.
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::RESERVED
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_reserved() {
        for h in [Handle::NULL, Handle::UNDEFINED, Handle::TRUE, Handle::FALSE] {
            assert!(h.is_reserved());
        }
        assert!(!Handle(Handle::RESERVED).is_reserved());
    }

    #[test]
    fn abi_encoding_is_unsigned() {
        let h = Handle::from_abi(-1);
        assert_eq!(h.0, u32::MAX);
        assert_eq!(h.to_abi(), -1);
        assert_eq!(Handle::from_bool(true), Handle::TRUE);
        assert_eq!(Handle::from_bool(false), Handle::FALSE);
    }
}
