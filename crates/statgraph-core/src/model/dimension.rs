//! Dimension option model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single option of a dimension within an instance.
///
/// `node_id` is assigned by the store once the option has been inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub dimension_name: String,
    pub option: String,
    pub node_id: Option<String>,
}

impl Dimension {
    pub fn new(dimension_name: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            dimension_name: dimension_name.into(),
            option: option.into(),
            node_id: None,
        }
    }
}

/// Records which (instance, dimension) pairs already have their uniqueness
/// constraint. Keyed by [`constraint_key`].
pub type ConstraintCache = HashMap<String, String>;

/// Cache key for an (instance, dimension) pair: `_{instance}_{dimension}`.
pub fn constraint_key(instance_id: &str, dimension_name: &str) -> String {
    format!("_{}_{}", instance_id, dimension_name)
}

/// Lookup key for a dimension option's store node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionKey {
    pub instance_id: String,
    pub dimension_name: String,
    pub option: String,
}

impl OptionKey {
    pub fn new(
        instance_id: impl Into<String>,
        dimension_name: impl Into<String>,
        option: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            dimension_name: dimension_name.into(),
            option: option.into(),
        }
    }
}
