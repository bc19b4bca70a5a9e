//! Node labels of the statgraph data model.
//!
//! Instance-scoped data lives under labels derived from the instance id (and
//! dimension name), so the labels are always rendered escaped.

/// Backtick-quote a label, doubling any embedded backtick.
pub fn escape(label: &str) -> String {
    format!("`{}`", label.replace('`', "``"))
}

/// Nodes of an instance dimension's hierarchy.
pub fn hierarchy_node(instance_id: &str, dimension: &str) -> String {
    escape(&format!("_hierarchy_node_{}_{}", instance_id, dimension))
}

/// Nodes of a code list's generic hierarchy.
pub fn generic_hierarchy_node(code_list_id: &str) -> String {
    escape(&format!("_generic_hierarchy_node_{}", code_list_id))
}

pub fn instance(instance_id: &str) -> String {
    escape(&format!("_{}_Instance", instance_id))
}

/// Options of one dimension of an instance.
pub fn dimension_option(instance_id: &str, dimension: &str) -> String {
    escape(&format!("_{}_{}", instance_id, dimension))
}

pub fn observation(instance_id: &str) -> String {
    escape(&format!("_{}_observation", instance_id))
}

pub fn code_list(code_list_id: &str) -> String {
    escape(&format!("_code_list_{}", code_list_id))
}

/// Flag label carried by code lists, e.g. `_geography`.
pub fn code_list_flag(flag: &str) -> String {
    escape(&format!("_{}", flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_escaped() {
        assert_eq!(hierarchy_node("inst-1", "geography"), "`_hierarchy_node_inst-1_geography`");
        assert_eq!(instance("a`b"), "`_a``b_Instance`");
        assert_eq!(dimension_option("i", "age"), "`_i_age`");
    }
}
