//! Tagged service resources: the `(id, signature, dimension values)` records
//! carried by a service-tags snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tagctx_primitives::ResourceId;

use crate::access_resource::ResourceValue;
use crate::dimension::DimensionName;
use crate::error::{ModelError, ModelResult};

/// An identified, dimension-keyed tagged resource.
///
/// A zero-length `signature` signals a deletion when this resource appears
/// inside a delta.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceResource {
    id: ResourceId,
    signature: String,
    resource_elements: BTreeMap<DimensionName, ResourceValue>,
}

impl ServiceResource {
    /// Builds a service resource after validating its fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyField`] if `signature` is non-empty but
    /// whitespace-only (ambiguous with a deletion marker).
    pub fn new(
        id: ResourceId,
        signature: impl Into<String>,
        resource_elements: BTreeMap<DimensionName, ResourceValue>,
    ) -> ModelResult<Self> {
        let signature = signature.into();
        if !signature.is_empty() && signature.trim().is_empty() {
            return Err(ModelError::EmptyField {
                field: "service resource signature",
            });
        }
        Ok(Self {
            id,
            signature,
            resource_elements,
        })
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the resource signature (empty signals a delete in a delta).
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns `true` when this resource marks a deletion.
    #[must_use]
    pub fn is_delete_marker(&self) -> bool {
        self.signature.is_empty()
    }

    /// Returns the dimension→value map for this resource.
    #[must_use]
    pub fn resource_elements(&self) -> &BTreeMap<DimensionName, ResourceValue> {
        &self.resource_elements
    }

    /// Returns the set of populated dimension names.
    #[must_use]
    pub fn populated_dimensions(&self) -> std::collections::BTreeSet<DimensionName> {
        self.resource_elements.keys().cloned().collect()
    }
}
