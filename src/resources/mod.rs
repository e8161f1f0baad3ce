//! Resource type catalog — provider knowledge the graph builder consults.
//!
//! The builder needs two facts per resource type:
//! 1. Which attributes the provider computes at apply time (valid reference
//!    targets even though nobody declares them)
//! 2. Whether the type accepts a `tags` attribute (for project tag inheritance)

pub mod aws;

/// Attributes every resource exposes once materialized.
pub const UNIVERSAL_COMPUTED: &[&str] = &["id", "arn"];

/// Provider-computed attributes for a resource type.
pub fn computed_attributes(resource_type: &str) -> impl Iterator<Item = &'static str> {
    UNIVERSAL_COMPUTED
        .iter()
        .chain(aws::computed_attributes(resource_type))
        .copied()
}

/// Whether `attribute` is computed by the provider for this type.
pub fn is_computed(resource_type: &str, attribute: &str) -> bool {
    computed_attributes(resource_type).any(|a| a == attribute)
}

/// Whether resources of this type carry a `tags` attribute.
pub fn supports_tags(resource_type: &str) -> bool {
    !aws::UNTAGGABLE.contains(&resource_type)
}
