//! Resource, service-resource, and tag data model for the tag-context
//! enricher.

#![warn(missing_docs, clippy::pedantic)]

mod access_resource;
mod dimension;
mod error;
mod match_type;
mod service_def;
mod service_resource;
mod tag;

pub use access_resource::{AccessResource, AccessType, LookupScope, MatchingScopes, ResourceValue};
pub use dimension::{DimensionName, PolicyType};
pub use error::{ModelError, ModelResult};
pub use match_type::MatchType;
pub use service_def::{Hierarchy, HierarchyValidityCache, ServiceDef};
pub use service_resource::ServiceResource;
pub use tag::{DayTimeMask, Tag, TagForEval, TagValidityPeriod};
