//! Resource dimension names and policy types.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Name of a resource dimension (e.g. `database`, `table`, `column`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionName(String);

impl DimensionName {
    /// Creates a new dimension name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the dimension name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DimensionName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for DimensionName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DimensionName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Policy types admitting resource hierarchies, in the fixed construction
/// order used by matcher selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Access policies (read/write/select style permissions).
    Access,
    /// Data-masking policies.
    DataMask,
    /// Row-filter policies.
    RowFilter,
}

impl PolicyType {
    /// Returns the fixed construction order in which policy types are tried
    /// when selecting a hierarchy for a service resource.
    #[must_use]
    pub const fn construction_order() -> [Self; 3] {
        [Self::Access, Self::DataMask, Self::RowFilter]
    }
}

impl Display for PolicyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Access => "access",
            Self::DataMask => "datamask",
            Self::RowFilter => "row-filter",
        };
        f.write_str(label)
    }
}
