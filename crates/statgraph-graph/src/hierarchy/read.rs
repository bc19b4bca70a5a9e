use std::cmp::Ordering;
use std::collections::HashSet;

use statgraph_core::model::{HierarchyElement, HierarchyResponse};
use statgraph_core::{GraphError, GraphResult};

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::statement::Statement;
use crate::store::Row;

fn element_from_row(row: &Row) -> GraphResult<HierarchyElement> {
    Ok(HierarchyElement {
        id: row.get_str("id")?,
        code: row.get_str("code")?,
        label: row.get_opt_str("label")?.unwrap_or_default(),
        has_data: row.get_bool("hasData")?,
        number_of_children: row.get_opt_i64("numberOfChildren")?.unwrap_or(0),
        order: row.get_opt_i64("order")?,
    })
}

fn elements(rows: &[Row]) -> GraphResult<Vec<HierarchyElement>> {
    rows.iter().map(element_from_row).collect()
}

/// Orders siblings by `order` when any of them carries one (unordered
/// siblings go last), otherwise by label.
pub fn sort_children(children: &mut [HierarchyElement]) {
    if children.iter().any(|c| c.order.is_some()) {
        children.sort_by(|a, b| match (a.order, b.order) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.label.cmp(&b.label)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.label.cmp(&b.label),
        });
    } else {
        children.sort_by(|a, b| a.label.cmp(&b.label));
    }
}

impl GraphDb {
    pub(super) async fn hierarchy_root(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
    ) -> GraphResult<HierarchyResponse> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;

        let statement = Statement::GetHierarchyRoot {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
        };
        let row = self.read_one(cancel, &statement, "hierarchy root").await?;
        let element = element_from_row(&row)?;
        let children = self.hierarchy_children(cancel, instance_id, dimension, &element.code).await?;

        Ok(HierarchyResponse {
            element,
            children,
            breadcrumbs: Vec::new(),
        })
    }

    pub(super) async fn hierarchy_element(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
        code: &str,
    ) -> GraphResult<HierarchyResponse> {
        require(instance_id, "instance id")?;
        require(dimension, "dimension name")?;
        require(code, "code")?;

        let statement = Statement::GetHierarchyElement {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code: code.to_string(),
        };
        let row = self.read_one(cancel, &statement, "hierarchy element").await?;
        let element = element_from_row(&row)?;
        let children = self.hierarchy_children(cancel, instance_id, dimension, code).await?;
        let breadcrumbs = self.hierarchy_breadcrumbs(cancel, instance_id, dimension, code).await?;

        Ok(HierarchyResponse {
            element,
            children,
            breadcrumbs,
        })
    }

    async fn hierarchy_children(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
        code: &str,
    ) -> GraphResult<Vec<HierarchyElement>> {
        let statement = Statement::GetHierarchyChildren {
            instance_id: instance_id.to_string(),
            dimension: dimension.to_string(),
            code: code.to_string(),
        };
        let mut children = elements(&self.read(cancel, &statement).await?)?;
        sort_children(&mut children);
        Ok(children)
    }

    /// Ancestors of `code`, nearest first, excluding the root.
    async fn hierarchy_breadcrumbs(
        &self,
        cancel: &CancelToken,
        instance_id: &str,
        dimension: &str,
        code: &str,
    ) -> GraphResult<Vec<HierarchyElement>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([code.to_string()]);
        let mut current = code.to_string();

        loop {
            let statement = Statement::GetHierarchyParent {
                instance_id: instance_id.to_string(),
                dimension: dimension.to_string(),
                code: current.clone(),
            };
            let rows = self.read(cancel, &statement).await?;
            let parent = match rows.as_slice() {
                [] => break,
                [row] => element_from_row(row)?,
                _ => {
                    return Err(GraphError::multiple_found(format!(
                        "parents of '{}' ({} results)",
                        current,
                        rows.len()
                    )))
                }
            };

            if !seen.insert(parent.code.clone()) {
                return Err(GraphError::Internal(format!("cycle in hierarchy at code '{}'", parent.code)));
            }
            current = parent.code.clone();
            chain.push(parent);
        }

        // The last ancestor found has no parent of its own: that is the root.
        chain.pop();
        Ok(chain)
    }
}
