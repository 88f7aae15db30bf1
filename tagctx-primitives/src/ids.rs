//! Identifier newtypes shared across the tag-context enricher crates.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier for a tagged service resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(i64);

/// Identifier for a tag definition.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(i64);

macro_rules! numeric_id {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a raw numeric identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $ty {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$ty> for i64 {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

numeric_id!(ResourceId);
numeric_id!(TagId);

/// Monotonic version counter attached to service-tags snapshots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagVersion(i64);

impl TagVersion {
    /// Sentinel used to request a full redownload on the next refresh cycle.
    pub const FORCE_REDOWNLOAD: Self = Self(-1);

    /// Version used before any snapshot has ever been installed.
    pub const UNINITIALIZED: Self = Self(-1);

    /// Wraps a raw version number.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns `true` when this version forces a full redownload.
    #[must_use]
    pub const fn is_force_redownload(self) -> bool {
        self.0 < 0
    }
}

impl Default for TagVersion {
    fn default() -> Self {
        Self::UNINITIALIZED
    }
}

impl Display for TagVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_round_trip() {
        let id = ResourceId::new(42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn force_redownload_is_negative() {
        assert!(TagVersion::FORCE_REDOWNLOAD.is_force_redownload());
        assert!(!TagVersion::new(0).is_force_redownload());
    }
}
