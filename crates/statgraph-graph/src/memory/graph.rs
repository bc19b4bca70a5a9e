//! In-process property graph and statement interpretation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use statgraph_core::StoreError;

use crate::statement::{ObservationRecord, SelectedDimension, Statement};
use crate::store::Row;

/// What a statement produced.
#[derive(Debug)]
pub(crate) enum Outcome {
    Affected(i64),
    Rows(Vec<Row>),
    Count(i64),
}

#[derive(Debug, Clone)]
pub(crate) struct GenericNode {
    pub id: String,
    pub code: String,
    pub label: String,
    pub order: Option<i64>,
    pub parents: BTreeSet<String>,
}

/// An instance hierarchy node as stored, including the transient
/// pipeline properties.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHierarchyNode {
    pub id: String,
    pub code: String,
    pub label: String,
    pub code_list_id: String,
    pub has_data: bool,
    pub number_of_children: Option<i64>,
    pub order: Option<i64>,
    pub remain: Option<bool>,
    pub clone_of: Option<String>,
    /// Targets of outgoing `hasParent` edges.
    pub parents: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CodeListEntry {
    pub id: String,
    pub edition: String,
    pub label: String,
    pub flags: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CodeEntry {
    pub code_list_id: String,
    pub edition: String,
    pub code: String,
    pub label: String,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InstanceEntry {
    pub header: String,
    pub dimensions: Vec<String>,
    pub dataset_id: Option<String>,
    pub edition: Option<String>,
    pub version: Option<i64>,
    pub published: bool,
    /// (code list, code) pairs linked with `inDataset`.
    pub codes: BTreeSet<(String, String)>,
}

#[derive(Debug, Clone)]
pub(crate) struct OptionEntry {
    pub dimension: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ObservationEntry {
    pub value: String,
    pub row_index: i64,
    pub option_ids: Vec<String>,
}

type HierarchyKey = (String, String);

#[derive(Debug, Default)]
pub(crate) struct MemoryGraph {
    next_id: u64,
    pub code_lists: Vec<CodeListEntry>,
    pub codes: Vec<CodeEntry>,
    pub generic: BTreeMap<String, BTreeMap<String, GenericNode>>,
    pub instances: BTreeMap<String, InstanceEntry>,
    /// (instance, dimension) -> option value -> node id
    pub options: BTreeMap<HierarchyKey, BTreeMap<String, String>>,
    pub option_index: HashMap<String, OptionEntry>,
    pub observations: BTreeMap<String, Vec<ObservationEntry>>,
    pub hierarchies: BTreeMap<HierarchyKey, BTreeMap<String, MemoryHierarchyNode>>,
    pub constraints: BTreeSet<String>,
}

fn key(instance_id: &str, dimension: &str) -> HierarchyKey {
    (instance_id.to_string(), dimension.to_string())
}

fn rejected(message: impl Into<String>) -> StoreError {
    StoreError::new(format!("invalid request arguments: {}", message.into()))
}

fn id_rows(ids: impl IntoIterator<Item = String>) -> Vec<Row> {
    ids.into_iter().map(|id| Row::new().with("id", id)).collect()
}

fn node_row(node: &MemoryHierarchyNode) -> Row {
    Row::new()
        .with("id", node.id.as_str())
        .with("code", node.code.as_str())
        .with("label", node.label.as_str())
        .with("hasData", node.has_data)
        .with("numberOfChildren", node.number_of_children.unwrap_or(0))
        .with("order", node.order)
}

impl MemoryGraph {
    pub fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn add_generic_node(&mut self, code_list_id: &str, code: &str, label: &str, order: Option<i64>) -> String {
        let id = self.next_id();
        self.generic.entry(code_list_id.to_string()).or_default().insert(
            id.clone(),
            GenericNode {
                id: id.clone(),
                code: code.to_string(),
                label: label.to_string(),
                order,
                parents: BTreeSet::new(),
            },
        );
        id
    }

    pub fn generic_id_for_code(&self, code_list_id: &str, code: &str) -> Option<String> {
        self.generic
            .get(code_list_id)?
            .values()
            .find(|n| n.code == code)
            .map(|n| n.id.clone())
    }

    fn hierarchy_mut(&mut self, instance_id: &str, dimension: &str) -> &mut BTreeMap<String, MemoryHierarchyNode> {
        self.hierarchies.entry(key(instance_id, dimension)).or_default()
    }

    fn hierarchy(&self, instance_id: &str, dimension: &str) -> Option<&BTreeMap<String, MemoryHierarchyNode>> {
        self.hierarchies.get(&key(instance_id, dimension))
    }

    fn node_by_code<'a>(&'a self, instance_id: &str, dimension: &str, code: &str) -> Option<&'a MemoryHierarchyNode> {
        self.hierarchy(instance_id, dimension)?.values().find(|n| n.code == code)
    }

    pub fn apply(&mut self, statement: &Statement) -> Result<Outcome, StoreError> {
        use Statement::*;

        let outcome = match statement {
            CreateHierarchyConstraints { instance_id, dimension } => {
                self.constraints.insert(format!("hierarchy:{}:{}", instance_id, dimension));
                Outcome::Affected(0)
            }
            CloneNodes { instance_id, dimension, code_list_id } => {
                Outcome::Affected(self.clone_nodes(instance_id, dimension, code_list_id, None, false))
            }
            CloneNodesFromIds { instance_id, dimension, code_list_id, ids, has_data } => {
                let ids: HashSet<String> = ids.iter().cloned().collect();
                Outcome::Affected(self.clone_nodes(instance_id, dimension, code_list_id, Some(&ids), *has_data))
            }
            CountNodes { instance_id, dimension } => {
                Outcome::Count(self.hierarchy(instance_id, dimension).map_or(0, |h| h.len() as i64))
            }
            CloneRelationships { instance_id, dimension, code_list_id } => {
                Outcome::Affected(self.clone_relationships(instance_id, dimension, code_list_id, None))
            }
            CloneRelationshipsFromIds { instance_id, dimension, code_list_id, ids } => {
                let ids: HashSet<String> = ids.iter().cloned().collect();
                Outcome::Affected(self.clone_relationships(instance_id, dimension, code_list_id, Some(&ids)))
            }
            RemoveCloneEdges { instance_id, dimension } => {
                Outcome::Affected(self.remove_clone_edges(instance_id, dimension, None))
            }
            RemoveCloneEdgesFromSourceIds { instance_id, dimension, ids } => {
                let ids: HashSet<String> = ids.iter().cloned().collect();
                Outcome::Affected(self.remove_clone_edges(instance_id, dimension, Some(&ids)))
            }
            SetNumberOfChildren { instance_id, dimension } => {
                Outcome::Affected(self.set_number_of_children(instance_id, dimension, None))
            }
            SetNumberOfChildrenFromIds { instance_id, dimension, ids } => {
                let ids: HashSet<String> = ids.iter().cloned().collect();
                Outcome::Affected(self.set_number_of_children(instance_id, dimension, Some(&ids)))
            }
            SetHasData { instance_id, dimension } => {
                let codes: HashSet<String> = self
                    .options
                    .get(&key(instance_id, dimension))
                    .map(|o| o.keys().cloned().collect())
                    .unwrap_or_default();
                Outcome::Affected(self.set_has_data(instance_id, dimension, &codes))
            }
            SetHasDataForCodes { instance_id, dimension, codes } => {
                let codes: HashSet<String> = codes.iter().cloned().collect();
                Outcome::Affected(self.set_has_data(instance_id, dimension, &codes))
            }
            MarkNodesToRemain { instance_id, dimension } => {
                Outcome::Affected(self.mark_nodes_to_remain(instance_id, dimension))
            }
            RemoveNodesNotMarkedToRemain { instance_id, dimension } => {
                let nodes = self.hierarchy_mut(instance_id, dimension);
                let doomed: HashSet<String> = nodes
                    .values()
                    .filter(|n| n.remain != Some(true))
                    .map(|n| n.id.clone())
                    .collect();
                nodes.retain(|id, _| !doomed.contains(id));
                for node in nodes.values_mut() {
                    node.parents.retain(|p| !doomed.contains(p));
                }
                Outcome::Affected(doomed.len() as i64)
            }
            RemoveRemainMarker { instance_id, dimension } => {
                let mut affected = 0;
                for node in self.hierarchy_mut(instance_id, dimension).values_mut() {
                    if node.remain.take().is_some() {
                        affected += 1;
                    }
                }
                Outcome::Affected(affected)
            }

            GetCodesWithData { instance_id, dimension } => Outcome::Rows(
                self.options
                    .get(&key(instance_id, dimension))
                    .map(|o| o.keys().map(|code| Row::new().with("code", code.as_str())).collect())
                    .unwrap_or_default(),
            ),
            GetGenericHierarchyNodeIds { code_list_id, codes } => {
                let wanted: HashSet<&String> = codes.iter().collect();
                let ids = self
                    .generic
                    .get(code_list_id)
                    .map(|nodes| {
                        nodes
                            .values()
                            .filter(|n| wanted.contains(&n.code))
                            .map(|n| n.id.clone())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Outcome::Rows(id_rows(ids))
            }
            GetGenericHierarchyAncestryIds { code_list_id, ids } => {
                Outcome::Rows(id_rows(self.generic_ancestors(code_list_id, ids)))
            }
            GetHierarchyNodeIds { instance_id, dimension } => Outcome::Rows(id_rows(
                self.hierarchy(instance_id, dimension)
                    .map(|h| h.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
            )),

            GetHierarchyCodelist { instance_id, dimension } => Outcome::Rows(
                self.hierarchy(instance_id, dimension)
                    .and_then(|h| h.values().next())
                    .map(|n| vec![Row::new().with("code_list", n.code_list_id.as_str())])
                    .unwrap_or_default(),
            ),
            GetHierarchyRoot { instance_id, dimension } => Outcome::Rows(
                self.hierarchy(instance_id, dimension)
                    .map(|h| h.values().filter(|n| n.parents.is_empty()).map(node_row).collect())
                    .unwrap_or_default(),
            ),
            GetHierarchyElement { instance_id, dimension, code } => Outcome::Rows(
                self.hierarchy(instance_id, dimension)
                    .map(|h| h.values().filter(|n| &n.code == code).map(node_row).collect())
                    .unwrap_or_default(),
            ),
            GetHierarchyChildren { instance_id, dimension, code } => {
                let rows: Vec<Row> = match self.node_by_code(instance_id, dimension, code) {
                    Some(parent) => self
                        .hierarchy(instance_id, dimension)
                        .map(|h| {
                            h.values()
                                .filter(|n| n.parents.contains(&parent.id))
                                .map(node_row)
                                .collect()
                        })
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                Outcome::Rows(rows)
            }
            GetHierarchyParent { instance_id, dimension, code } => {
                let rows: Vec<Row> = match (self.node_by_code(instance_id, dimension, code), self.hierarchy(instance_id, dimension)) {
                    (Some(node), Some(h)) => node.parents.iter().filter_map(|p| h.get(p)).map(node_row).collect(),
                    _ => Vec::new(),
                };
                Outcome::Rows(rows)
            }

            CreateInstanceConstraint { instance_id } => {
                self.constraints.insert(format!("observation:{}", instance_id));
                Outcome::Affected(0)
            }
            CreateInstance { instance_id, header } => {
                self.instances.entry(instance_id.clone()).or_default().header = header.clone();
                Outcome::Affected(1)
            }
            AddDimensions { instance_id, dimensions } => match self.instances.get_mut(instance_id) {
                Some(instance) => {
                    instance.dimensions = dimensions.clone();
                    Outcome::Affected(1)
                }
                None => Outcome::Affected(0),
            },
            CreateCodeRelationship { instance_id, code_list_id, code } => {
                let code_known = self
                    .codes
                    .iter()
                    .any(|c| &c.code_list_id == code_list_id && &c.code == code);
                match self.instances.get_mut(instance_id) {
                    Some(instance) if code_known => {
                        instance.codes.insert((code_list_id.clone(), code.clone()));
                        Outcome::Affected(1)
                    }
                    _ => Outcome::Affected(0),
                }
            }
            InstanceExists { instance_id } => Outcome::Count(self.instances.contains_key(instance_id) as i64),
            CountInsertedObservations { instance_id } => {
                Outcome::Count(self.observations.get(instance_id).map_or(0, |o| o.len() as i64))
            }
            AddVersionDetails { instance_id, dataset_id, edition, version } => {
                match self.instances.get_mut(instance_id) {
                    Some(instance) => {
                        instance.dataset_id = Some(dataset_id.clone());
                        instance.edition = Some(edition.clone());
                        instance.version = Some(*version);
                        Outcome::Affected(1)
                    }
                    None => Outcome::Affected(0),
                }
            }
            SetInstanceIsPublished { instance_id } => match self.instances.get_mut(instance_id) {
                Some(instance) => {
                    instance.published = true;
                    Outcome::Affected(1)
                }
                None => Outcome::Affected(0),
            },

            CreateDimensionConstraint { instance_id, dimension } => {
                self.constraints.insert(format!("option:{}:{}", instance_id, dimension));
                Outcome::Affected(0)
            }
            InsertDimensionOption { instance_id, dimension, option } => {
                if !self.instances.contains_key(instance_id) {
                    return Ok(Outcome::Rows(Vec::new()));
                }
                let existing = self
                    .options
                    .get(&key(instance_id, dimension))
                    .and_then(|o| o.get(option))
                    .cloned();
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let id = self.next_id();
                        self.options
                            .entry(key(instance_id, dimension))
                            .or_default()
                            .insert(option.clone(), id.clone());
                        self.option_index.insert(
                            id.clone(),
                            OptionEntry {
                                dimension: dimension.clone(),
                                value: option.clone(),
                            },
                        );
                        id
                    }
                };
                Outcome::Rows(vec![Row::new().with("id", id)])
            }

            StreamCsvRows { instance_id, dimensions, limit } => {
                Outcome::Rows(self.csv_rows(instance_id, dimensions, *limit))
            }
            InsertObservations { instance_id, records } => {
                Outcome::Affected(self.insert_observations(instance_id, records)?)
            }

            GetCodeLists { filter_by } => {
                let ids: BTreeSet<String> = self
                    .code_lists
                    .iter()
                    .filter(|cl| filter_by.as_ref().map_or(true, |f| cl.flags.contains(f)))
                    .map(|cl| cl.id.clone())
                    .collect();
                Outcome::Rows(id_rows(ids))
            }
            CodeListExists { code_list_id } => {
                Outcome::Count(self.code_lists.iter().filter(|cl| &cl.id == code_list_id).count() as i64)
            }
            GetEditions { code_list_id } => Outcome::Rows(
                self.code_lists
                    .iter()
                    .filter(|cl| &cl.id == code_list_id)
                    .map(|cl| Row::new().with("edition", cl.edition.as_str()).with("label", cl.label.as_str()))
                    .collect(),
            ),
            GetEdition { code_list_id, edition } => Outcome::Rows(
                self.code_lists
                    .iter()
                    .filter(|cl| &cl.id == code_list_id && &cl.edition == edition)
                    .map(|cl| Row::new().with("edition", cl.edition.as_str()).with("label", cl.label.as_str()))
                    .collect(),
            ),
            CountCodes { code_list_id, edition } => Outcome::Count(
                self.codes
                    .iter()
                    .filter(|c| &c.code_list_id == code_list_id && &c.edition == edition)
                    .count() as i64,
            ),
            GetCodes { code_list_id, edition } => Outcome::Rows(
                self.codes
                    .iter()
                    .filter(|c| &c.code_list_id == code_list_id && &c.edition == edition)
                    .map(|c| Row::new().with("code", c.code.as_str()).with("label", c.label.as_str()))
                    .collect(),
            ),
            GetCode { code_list_id, edition, code } => Outcome::Rows(
                self.codes
                    .iter()
                    .filter(|c| &c.code_list_id == code_list_id && &c.edition == edition && &c.code == code)
                    .map(|c| Row::new().with("code", c.code.as_str()).with("label", c.label.as_str()))
                    .collect(),
            ),
            GetCodeDatasets { code_list_id, edition, code } => {
                let in_edition = self
                    .codes
                    .iter()
                    .any(|c| &c.code_list_id == code_list_id && &c.edition == edition && &c.code == code);
                let link = (code_list_id.clone(), code.clone());
                let rows = if in_edition {
                    self.instances
                        .values()
                        .filter(|i| i.published && i.codes.contains(&link))
                        .filter_map(|i| {
                            Some(
                                Row::new()
                                    .with("dataset_id", i.dataset_id.clone()?)
                                    .with("edition", i.edition.clone()?)
                                    .with("version", i.version?),
                            )
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                Outcome::Rows(rows)
            }
            GetCodeOrder { code_list_id, code } => Outcome::Rows(
                self.codes
                    .iter()
                    .filter(|c| &c.code_list_id == code_list_id && &c.code == code)
                    .take(1)
                    .map(|c| Row::new().with("order", c.order))
                    .collect(),
            ),

            Ping => Outcome::Rows(vec![Row::new().with("ok", 1i64)]),
        };

        Ok(outcome)
    }

    /// Upsert one instance node per generic node, keyed by code.
    fn clone_nodes(
        &mut self,
        instance_id: &str,
        dimension: &str,
        code_list_id: &str,
        only: Option<&HashSet<String>>,
        has_data: bool,
    ) -> i64 {
        let sources: Vec<GenericNode> = self
            .generic
            .get(code_list_id)
            .map(|nodes| {
                nodes
                    .values()
                    .filter(|n| only.map_or(true, |ids| ids.contains(&n.id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut affected = 0;
        for source in sources {
            let existing = self
                .hierarchy(instance_id, dimension)
                .and_then(|h| h.values().find(|n| n.code == source.code))
                .map(|n| n.id.clone());

            match existing {
                Some(id) => {
                    if let Some(node) = self.hierarchy_mut(instance_id, dimension).get_mut(&id) {
                        node.clone_of = Some(source.id.clone());
                        node.has_data |= has_data;
                    }
                }
                None => {
                    let id = self.next_id();
                    let node = MemoryHierarchyNode {
                        id: id.clone(),
                        code: source.code.clone(),
                        label: source.label.clone(),
                        code_list_id: code_list_id.to_string(),
                        has_data,
                        number_of_children: None,
                        order: source.order,
                        remain: None,
                        clone_of: Some(source.id.clone()),
                        parents: BTreeSet::new(),
                    };
                    self.hierarchy_mut(instance_id, dimension).insert(id, node);
                }
            }
            affected += 1;
        }
        affected
    }

    fn clone_relationships(
        &mut self,
        instance_id: &str,
        dimension: &str,
        code_list_id: &str,
        only: Option<&HashSet<String>>,
    ) -> i64 {
        let Some(generic) = self.generic.get(code_list_id) else {
            return 0;
        };
        let Some(nodes) = self.hierarchies.get_mut(&key(instance_id, dimension)) else {
            return 0;
        };

        let clone_of: HashMap<String, String> = nodes
            .values()
            .filter_map(|n| Some((n.clone_of.clone()?, n.id.clone())))
            .collect();

        let mut affected = 0;
        for node in nodes.values_mut() {
            let Some(source) = node.clone_of.as_ref() else { continue };
            if only.is_some_and(|ids| !ids.contains(source)) {
                continue;
            }
            let Some(generic_node) = generic.get(source) else { continue };
            for parent in &generic_node.parents {
                if let Some(parent_clone) = clone_of.get(parent) {
                    if node.parents.insert(parent_clone.clone()) {
                        affected += 1;
                    }
                }
            }
        }
        affected
    }

    fn remove_clone_edges(&mut self, instance_id: &str, dimension: &str, only: Option<&HashSet<String>>) -> i64 {
        let mut affected = 0;
        for node in self.hierarchy_mut(instance_id, dimension).values_mut() {
            let matches = match (&node.clone_of, only) {
                (Some(source), Some(ids)) => ids.contains(source),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if matches {
                node.clone_of = None;
                affected += 1;
            }
        }
        affected
    }

    fn set_number_of_children(&mut self, instance_id: &str, dimension: &str, only: Option<&HashSet<String>>) -> i64 {
        let nodes = self.hierarchy_mut(instance_id, dimension);
        let mut counts: HashMap<String, i64> = HashMap::new();
        for node in nodes.values() {
            for parent in &node.parents {
                *counts.entry(parent.clone()).or_default() += 1;
            }
        }

        let mut affected = 0;
        for node in nodes.values_mut() {
            if only.is_some_and(|ids| !ids.contains(&node.id)) {
                continue;
            }
            node.number_of_children = Some(counts.get(&node.id).copied().unwrap_or(0));
            affected += 1;
        }
        affected
    }

    fn set_has_data(&mut self, instance_id: &str, dimension: &str, codes: &HashSet<String>) -> i64 {
        let mut affected = 0;
        for node in self.hierarchy_mut(instance_id, dimension).values_mut() {
            if codes.contains(&node.code) {
                node.has_data = true;
                affected += 1;
            }
        }
        affected
    }

    fn mark_nodes_to_remain(&mut self, instance_id: &str, dimension: &str) -> i64 {
        let nodes = self.hierarchy_mut(instance_id, dimension);
        let mut pending: Vec<String> = nodes.values().filter(|n| n.has_data).map(|n| n.id.clone()).collect();
        let mut marked: HashSet<String> = HashSet::new();

        while let Some(id) = pending.pop() {
            if !marked.insert(id.clone()) {
                continue;
            }
            if let Some(node) = nodes.get_mut(&id) {
                node.remain = Some(true);
                pending.extend(node.parents.iter().cloned());
            }
        }
        marked.len() as i64
    }

    fn generic_ancestors(&self, code_list_id: &str, ids: &[String]) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(nodes) = self.generic.get(code_list_id) else {
            return found;
        };

        let mut pending: Vec<String> = ids
            .iter()
            .filter_map(|id| nodes.get(id))
            .flat_map(|n| n.parents.iter().cloned())
            .collect();
        while let Some(id) = pending.pop() {
            if found.insert(id.clone()) {
                if let Some(node) = nodes.get(&id) {
                    pending.extend(node.parents.iter().cloned());
                }
            }
        }
        found
    }

    fn csv_rows(&self, instance_id: &str, dimensions: &[SelectedDimension], limit: Option<i64>) -> Vec<Row> {
        let Some(instance) = self.instances.get(instance_id) else {
            return Vec::new();
        };

        let mut rows = vec![Row::new().with("row", instance.header.as_str())];

        let mut observations: Vec<&ObservationEntry> = self
            .observations
            .get(instance_id)
            .map(|o| o.iter().collect())
            .unwrap_or_default();
        observations.sort_by_key(|o| o.row_index);

        let matching = observations.into_iter().filter(|obs| {
            dimensions.iter().all(|dim| {
                obs.option_ids.iter().any(|id| {
                    self.option_index
                        .get(id)
                        .is_some_and(|o| o.dimension == dim.name && dim.options.contains(&o.value))
                })
            })
        });

        let limit = limit.map_or(usize::MAX, |l| l.max(0) as usize);
        rows.extend(matching.take(limit).map(|o| Row::new().with("row", o.value.as_str())));
        rows
    }

    fn insert_observations(&mut self, instance_id: &str, records: &[ObservationRecord]) -> Result<i64, StoreError> {
        if !self.instances.contains_key(instance_id) {
            return Ok(0);
        }
        for record in records {
            if let Some(missing) = record.option_ids.iter().find(|id| !self.option_index.contains_key(*id)) {
                return Err(rejected(format!("unknown dimension option node '{}'", missing)));
            }
        }

        let entries = self.observations.entry(instance_id.to_string()).or_default();
        entries.extend(records.iter().map(|r| ObservationEntry {
            value: r.value.clone(),
            row_index: r.row_index,
            option_ids: r.option_ids.clone(),
        }));
        Ok(records.len() as i64)
    }
}
