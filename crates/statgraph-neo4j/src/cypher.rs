//! Cypher rendering of [`Statement`]s.
//!
//! Writes report their effect through a trailing `RETURN count(..) AS
//! affected`; counts through `AS count`. Schema statements return nothing.

use statgraph_graph::{SelectedDimension, Statement};

use crate::labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Schema changes; run without reading a result.
    Schema,
    /// Single row with an `affected` column.
    Write,
    /// Any number of rows with the declared columns.
    Rows,
    /// Single row with a `count` column.
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    OptText,
    Int,
    OptInt,
    OptBool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Str(String),
    Int(i64),
    Bool(bool),
    StrList(Vec<String>),
    IntList(Vec<i64>),
    StrLists(Vec<Vec<String>>),
}

pub type Columns = &'static [(&'static str, ColumnKind)];

const NONE: Columns = &[];
const ID: Columns = &[("id", ColumnKind::Text)];
const CODE: Columns = &[("code", ColumnKind::Text)];
const ROW: Columns = &[("row", ColumnKind::Text)];
const NODE: Columns = &[
    ("id", ColumnKind::Text),
    ("code", ColumnKind::Text),
    ("label", ColumnKind::OptText),
    ("hasData", ColumnKind::OptBool),
    ("numberOfChildren", ColumnKind::OptInt),
    ("order", ColumnKind::OptInt),
];
const EDITION: Columns = &[("edition", ColumnKind::Text), ("label", ColumnKind::OptText)];
const CODE_LABEL: Columns = &[("code", ColumnKind::Text), ("label", ColumnKind::OptText)];
const DATASET: Columns = &[
    ("dataset_id", ColumnKind::Text),
    ("edition", ColumnKind::Text),
    ("version", ColumnKind::Int),
];

const NODE_PROJECTION: &str = "RETURN toString(id(n)) AS id, n.code AS code, n.label AS label, \
     n.hasData AS hasData, n.numberOfChildren AS numberOfChildren, n.order AS order";

/// Node ids travel as strings and are matched as integers.
const IDS: &str = "[x IN $ids | toInteger(x)]";

#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub text: String,
    pub params: Vec<(&'static str, Param)>,
    pub mode: QueryMode,
    pub columns: Columns,
}

impl CypherQuery {
    fn new(mode: QueryMode, columns: Columns, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
            mode,
            columns,
        }
    }

    fn schema(text: impl Into<String>) -> Self {
        Self::new(QueryMode::Schema, NONE, text)
    }

    fn write(text: impl Into<String>) -> Self {
        Self::new(QueryMode::Write, NONE, text)
    }

    fn count(text: impl Into<String>) -> Self {
        Self::new(QueryMode::Count, NONE, text)
    }

    fn rows(columns: Columns, text: impl Into<String>) -> Self {
        Self::new(QueryMode::Rows, columns, text)
    }

    fn param(mut self, name: &'static str, value: Param) -> Self {
        self.params.push((name, value));
        self
    }

    fn str(self, name: &'static str, value: &str) -> Self {
        self.param(name, Param::Str(value.to_string()))
    }

    fn ids(self, ids: &[String]) -> Self {
        self.param("ids", Param::StrList(ids.to_vec()))
    }
}

pub fn render(statement: &Statement) -> CypherQuery {
    use Statement::*;

    match statement {
        CreateHierarchyConstraints { instance_id, dimension } => CypherQuery::schema(format!(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE n.code IS UNIQUE",
            labels::hierarchy_node(instance_id, dimension)
        )),
        CloneNodes { instance_id, dimension, code_list_id } => CypherQuery::write(format!(
            "MATCH (g:{g}) \
             MERGE (n:{h} {{code: g.code}}) \
             ON CREATE SET n.hasData = false \
             SET n.label = g.label, n.order = g.order, n.code_list = $code_list \
             MERGE (n)-[:clone_of]->(g) \
             RETURN count(n) AS affected",
            g = labels::generic_hierarchy_node(code_list_id),
            h = labels::hierarchy_node(instance_id, dimension),
        ))
        .str("code_list", code_list_id),
        CloneNodesFromIds { instance_id, dimension, code_list_id, ids, has_data } => CypherQuery::write(format!(
            "MATCH (g:{g}) WHERE id(g) IN {IDS} \
             MERGE (n:{h} {{code: g.code}}) \
             ON CREATE SET n.hasData = $has_data \
             ON MATCH SET n.hasData = coalesce(n.hasData, false) OR $has_data \
             SET n.label = g.label, n.order = g.order, n.code_list = $code_list \
             MERGE (n)-[:clone_of]->(g) \
             RETURN count(n) AS affected",
            g = labels::generic_hierarchy_node(code_list_id),
            h = labels::hierarchy_node(instance_id, dimension),
        ))
        .str("code_list", code_list_id)
        .param("has_data", Param::Bool(*has_data))
        .ids(ids),
        CountNodes { instance_id, dimension } => CypherQuery::count(format!(
            "MATCH (n:{}) RETURN count(n) AS count",
            labels::hierarchy_node(instance_id, dimension)
        )),
        CloneRelationships { instance_id, dimension, code_list_id } => {
            clone_relationships(instance_id, dimension, code_list_id, None)
        }
        CloneRelationshipsFromIds { instance_id, dimension, code_list_id, ids } => {
            clone_relationships(instance_id, dimension, code_list_id, Some(ids))
        }
        RemoveCloneEdges { instance_id, dimension } => CypherQuery::write(format!(
            "MATCH (n:{})-[r:clone_of]->() DELETE r RETURN count(r) AS affected",
            labels::hierarchy_node(instance_id, dimension)
        )),
        RemoveCloneEdgesFromSourceIds { instance_id, dimension, ids } => CypherQuery::write(format!(
            "MATCH (n:{})-[r:clone_of]->(g) WHERE id(g) IN {IDS} DELETE r RETURN count(r) AS affected",
            labels::hierarchy_node(instance_id, dimension)
        ))
        .ids(ids),
        SetNumberOfChildren { instance_id, dimension } => set_number_of_children(instance_id, dimension, None),
        SetNumberOfChildrenFromIds { instance_id, dimension, ids } => {
            set_number_of_children(instance_id, dimension, Some(ids))
        }
        SetHasData { instance_id, dimension } => CypherQuery::write(format!(
            "MATCH (n:{h}), (d:{d}) WHERE n.code = d.value \
             SET n.hasData = true \
             RETURN count(DISTINCT n) AS affected",
            h = labels::hierarchy_node(instance_id, dimension),
            d = labels::dimension_option(instance_id, dimension),
        )),
        SetHasDataForCodes { instance_id, dimension, codes } => CypherQuery::write(format!(
            "MATCH (n:{}) WHERE n.code IN $codes SET n.hasData = true RETURN count(n) AS affected",
            labels::hierarchy_node(instance_id, dimension)
        ))
        .param("codes", Param::StrList(codes.clone())),
        MarkNodesToRemain { instance_id, dimension } => CypherQuery::write(format!(
            "MATCH (n:{h} {{hasData: true}}) \
             OPTIONAL MATCH (n)-[:hasParent*]->(a:{h}) \
             WITH collect(DISTINCT n) + collect(DISTINCT a) AS nodes \
             UNWIND nodes AS m \
             WITH DISTINCT m \
             SET m.remain = true \
             RETURN count(m) AS affected",
            h = labels::hierarchy_node(instance_id, dimension),
        )),
        RemoveNodesNotMarkedToRemain { instance_id, dimension } => CypherQuery::write(format!(
            "MATCH (n:{}) WHERE n.remain IS NULL DETACH DELETE n RETURN count(n) AS affected",
            labels::hierarchy_node(instance_id, dimension)
        )),
        RemoveRemainMarker { instance_id, dimension } => CypherQuery::write(format!(
            "MATCH (n:{}) WHERE n.remain IS NOT NULL REMOVE n.remain RETURN count(n) AS affected",
            labels::hierarchy_node(instance_id, dimension)
        )),

        GetCodesWithData { instance_id, dimension } => CypherQuery::rows(
            CODE,
            format!(
                "MATCH (d:{}) RETURN DISTINCT d.value AS code",
                labels::dimension_option(instance_id, dimension)
            ),
        ),
        GetGenericHierarchyNodeIds { code_list_id, codes } => CypherQuery::rows(
            ID,
            format!(
                "MATCH (g:{}) WHERE g.code IN $codes RETURN toString(id(g)) AS id",
                labels::generic_hierarchy_node(code_list_id)
            ),
        )
        .param("codes", Param::StrList(codes.clone())),
        GetGenericHierarchyAncestryIds { code_list_id, ids } => CypherQuery::rows(
            ID,
            format!(
                "MATCH (g:{g})-[:hasParent*]->(a:{g}) WHERE id(g) IN {IDS} \
                 RETURN DISTINCT toString(id(a)) AS id",
                g = labels::generic_hierarchy_node(code_list_id),
            ),
        )
        .ids(ids),
        GetHierarchyNodeIds { instance_id, dimension } => CypherQuery::rows(
            ID,
            format!(
                "MATCH (n:{}) RETURN toString(id(n)) AS id",
                labels::hierarchy_node(instance_id, dimension)
            ),
        ),

        GetHierarchyCodelist { instance_id, dimension } => CypherQuery::rows(
            &[("code_list", ColumnKind::Text)],
            format!(
                "MATCH (n:{}) RETURN n.code_list AS code_list LIMIT 1",
                labels::hierarchy_node(instance_id, dimension)
            ),
        ),
        GetHierarchyRoot { instance_id, dimension } => CypherQuery::rows(
            NODE,
            format!(
                "MATCH (n:{}) WHERE NOT (n)-[:hasParent]->() {NODE_PROJECTION}",
                labels::hierarchy_node(instance_id, dimension)
            ),
        ),
        GetHierarchyElement { instance_id, dimension, code } => CypherQuery::rows(
            NODE,
            format!(
                "MATCH (n:{} {{code: $code}}) {NODE_PROJECTION}",
                labels::hierarchy_node(instance_id, dimension)
            ),
        )
        .str("code", code),
        GetHierarchyChildren { instance_id, dimension, code } => CypherQuery::rows(
            NODE,
            format!(
                "MATCH (n:{h})-[:hasParent]->(:{h} {{code: $code}}) {NODE_PROJECTION}",
                h = labels::hierarchy_node(instance_id, dimension),
            ),
        )
        .str("code", code),
        GetHierarchyParent { instance_id, dimension, code } => CypherQuery::rows(
            NODE,
            format!(
                "MATCH (:{h} {{code: $code}})-[:hasParent]->(n:{h}) {NODE_PROJECTION}",
                h = labels::hierarchy_node(instance_id, dimension),
            ),
        )
        .str("code", code),

        CreateInstanceConstraint { instance_id } => CypherQuery::schema(format!(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (o:{}) REQUIRE o.rowIndex IS UNIQUE",
            labels::observation(instance_id)
        )),
        CreateInstance { instance_id, header } => CypherQuery::write(format!(
            "MERGE (i:{}) SET i.header = $header RETURN count(i) AS affected",
            labels::instance(instance_id)
        ))
        .str("header", header),
        AddDimensions { instance_id, dimensions } => CypherQuery::write(format!(
            "MATCH (i:{}) SET i.dimensions = $dimensions RETURN count(i) AS affected",
            labels::instance(instance_id)
        ))
        .param("dimensions", Param::StrList(dimensions.clone())),
        CreateCodeRelationship { instance_id, code_list_id, code } => CypherQuery::write(format!(
            "MATCH (i:{i}) \
             MATCH (c:_code {{value: $code}})-[:usedBy]->(:_code_list:{cl}) \
             MERGE (c)-[:inDataset]->(i) \
             RETURN count(DISTINCT c) AS affected",
            i = labels::instance(instance_id),
            cl = labels::code_list(code_list_id),
        ))
        .str("code", code),
        InstanceExists { instance_id } => CypherQuery::count(format!(
            "MATCH (i:{}) RETURN count(i) AS count",
            labels::instance(instance_id)
        )),
        CountInsertedObservations { instance_id } => CypherQuery::count(format!(
            "MATCH (o:{}) RETURN count(o) AS count",
            labels::observation(instance_id)
        )),
        AddVersionDetails { instance_id, dataset_id, edition, version } => CypherQuery::write(format!(
            "MATCH (i:{}) \
             SET i.dataset_id = $dataset_id, i.edition = $edition, i.version = $version \
             RETURN count(i) AS affected",
            labels::instance(instance_id)
        ))
        .str("dataset_id", dataset_id)
        .str("edition", edition)
        .param("version", Param::Int(*version)),
        SetInstanceIsPublished { instance_id } => CypherQuery::write(format!(
            "MATCH (i:{}) SET i.is_published = true RETURN count(i) AS affected",
            labels::instance(instance_id)
        )),

        CreateDimensionConstraint { instance_id, dimension } => CypherQuery::schema(format!(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (d:{}) REQUIRE d.value IS UNIQUE",
            labels::dimension_option(instance_id, dimension)
        )),
        InsertDimensionOption { instance_id, dimension, option } => CypherQuery::rows(
            ID,
            format!(
                "MATCH (i:{}) MERGE (d:{} {{value: $value}}) RETURN toString(id(d)) AS id",
                labels::instance(instance_id),
                labels::dimension_option(instance_id, dimension)
            ),
        )
        .str("value", option),

        StreamCsvRows { instance_id, dimensions, limit } => stream_csv_rows(instance_id, dimensions, *limit),
        InsertObservations { instance_id, records } => CypherQuery::write(format!(
            "UNWIND range(0, size($values) - 1) AS k \
             CREATE (o:{} {{value: $values[k], rowIndex: $indexes[k]}}) \
             WITH o, $option_ids[k] AS option_ids \
             CALL {{ WITH o, option_ids \
             UNWIND option_ids AS oid \
             MATCH (d) WHERE id(d) = toInteger(oid) \
             CREATE (o)-[:isValueOf]->(d) }} \
             RETURN count(o) AS affected",
            labels::observation(instance_id)
        ))
        .param("values", Param::StrList(records.iter().map(|r| r.value.clone()).collect()))
        .param("indexes", Param::IntList(records.iter().map(|r| r.row_index).collect()))
        .param("option_ids", Param::StrLists(records.iter().map(|r| r.option_ids.clone()).collect())),

        GetCodeLists { filter_by } => {
            let label = match filter_by {
                Some(flag) => format!("_code_list:{}", labels::code_list_flag(flag)),
                None => "_code_list".to_string(),
            };
            CypherQuery::rows(ID, format!("MATCH (cl:{label}) RETURN DISTINCT cl.id AS id ORDER BY id"))
        }
        CodeListExists { code_list_id } => CypherQuery::count(format!(
            "MATCH (cl:_code_list:{}) RETURN count(cl) AS count",
            labels::code_list(code_list_id)
        )),
        GetEditions { code_list_id } => CypherQuery::rows(
            EDITION,
            format!(
                "MATCH (cl:_code_list:{}) RETURN cl.edition AS edition, cl.label AS label",
                labels::code_list(code_list_id)
            ),
        ),
        GetEdition { code_list_id, edition } => CypherQuery::rows(
            EDITION,
            format!(
                "MATCH (cl:_code_list:{}) WHERE cl.edition = $edition \
                 RETURN cl.edition AS edition, cl.label AS label",
                labels::code_list(code_list_id)
            ),
        )
        .str("edition", edition),
        CountCodes { code_list_id, edition } => CypherQuery::count(format!(
            "MATCH (c:_code)-[:usedBy]->(cl:_code_list:{}) WHERE cl.edition = $edition \
             RETURN count(c) AS count",
            labels::code_list(code_list_id)
        ))
        .str("edition", edition),
        GetCodes { code_list_id, edition } => CypherQuery::rows(
            CODE_LABEL,
            format!(
                "MATCH (c:_code)-[r:usedBy]->(cl:_code_list:{}) WHERE cl.edition = $edition \
                 RETURN c.value AS code, r.label AS label",
                labels::code_list(code_list_id)
            ),
        )
        .str("edition", edition),
        GetCode { code_list_id, edition, code } => CypherQuery::rows(
            CODE_LABEL,
            format!(
                "MATCH (c:_code {{value: $code}})-[r:usedBy]->(cl:_code_list:{}) WHERE cl.edition = $edition \
                 RETURN c.value AS code, r.label AS label",
                labels::code_list(code_list_id)
            ),
        )
        .str("edition", edition)
        .str("code", code),
        GetCodeDatasets { code_list_id, edition, code } => CypherQuery::rows(
            DATASET,
            format!(
                "MATCH (i)<-[:inDataset]-(c:_code {{value: $code}})-[:usedBy]->(cl:_code_list:{}) \
                 WHERE cl.edition = $edition AND i.is_published = true \
                 RETURN i.dataset_id AS dataset_id, i.edition AS edition, i.version AS version",
                labels::code_list(code_list_id)
            ),
        )
        .str("edition", edition)
        .str("code", code),
        GetCodeOrder { code_list_id, code } => CypherQuery::rows(
            &[("order", ColumnKind::OptInt)],
            format!(
                "MATCH (c:_code {{value: $code}})-[r:usedBy]->(:_code_list:{}) RETURN r.order AS order LIMIT 1",
                labels::code_list(code_list_id)
            ),
        )
        .str("code", code),

        Ping => CypherQuery::rows(&[("ok", ColumnKind::Int)], "RETURN 1 AS ok"),
    }
}

fn clone_relationships(instance_id: &str, dimension: &str, code_list_id: &str, ids: Option<&Vec<String>>) -> CypherQuery {
    let filter = if ids.is_some() {
        format!("WHERE id(g) IN {IDS} ")
    } else {
        String::new()
    };
    let query = CypherQuery::write(format!(
        "MATCH (g:{g})-[:hasParent]->(gp:{g}) {filter}\
         MATCH (n:{h})-[:clone_of]->(g), (p:{h})-[:clone_of]->(gp) \
         MERGE (n)-[r:hasParent]->(p) \
         RETURN count(r) AS affected",
        g = labels::generic_hierarchy_node(code_list_id),
        h = labels::hierarchy_node(instance_id, dimension),
    ));
    match ids {
        Some(ids) => query.ids(ids),
        None => query,
    }
}

fn set_number_of_children(instance_id: &str, dimension: &str, ids: Option<&Vec<String>>) -> CypherQuery {
    let filter = if ids.is_some() {
        format!("WHERE id(n) IN {IDS} ")
    } else {
        String::new()
    };
    let query = CypherQuery::write(format!(
        "MATCH (n:{h}) {filter}\
         OPTIONAL MATCH (c:{h})-[:hasParent]->(n) \
         WITH n, count(c) AS children \
         SET n.numberOfChildren = children \
         RETURN count(n) AS affected",
        h = labels::hierarchy_node(instance_id, dimension),
    ));
    match ids {
        Some(ids) => query.ids(ids),
        None => query,
    }
}

/// Header row, then the observation rows matching every selected dimension.
fn stream_csv_rows(instance_id: &str, dimensions: &[SelectedDimension], limit: Option<i64>) -> CypherQuery {
    const DIM_PARAMS: [&str; 16] = [
        "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12", "d13", "d14", "d15",
    ];

    let mut text = format!(
        "MATCH (i:{}) RETURN i.header AS row UNION ALL MATCH (o:{})",
        labels::instance(instance_id),
        labels::observation(instance_id)
    );
    let mut params = Vec::new();

    for (n, dim) in dimensions.iter().enumerate() {
        // Beyond the named slots the options are inlined as a list literal.
        let options = match DIM_PARAMS.get(n) {
            Some(name) => {
                params.push((*name, Param::StrList(dim.options.clone())));
                format!("${name}")
            }
            None => list_literal(&dim.options),
        };
        text.push_str(&format!(
            " MATCH (o)-[:isValueOf]->(o{n}:{}) WHERE o{n}.value IN {options}",
            labels::dimension_option(instance_id, &dim.name)
        ));
    }

    text.push_str(" RETURN o.value AS row ORDER BY o.rowIndex");
    if let Some(limit) = limit {
        text.push_str(" LIMIT $limit");
        params.push(("limit", Param::Int(limit)));
    }

    let mut query = CypherQuery::rows(ROW, text);
    query.params = params;
    query
}

fn list_literal(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use statgraph_graph::ObservationRecord;

    fn param<'a>(query: &'a CypherQuery, name: &str) -> Option<&'a Param> {
        query.params.iter().find(|(n, _)| *n == name).map(|(_, p)| p)
    }

    #[test]
    fn test_filter_omits_dimensions_without_options() {
        // The selection arrives already stripped of option-less dimensions.
        let query = render(&Statement::StreamCsvRows {
            instance_id: "inst".into(),
            dimensions: vec![SelectedDimension {
                name: "age".into(),
                options: vec!["29".into(), "30".into()],
            }],
            limit: None,
        });

        assert!(query.text.contains("(o0:`_inst_age`) WHERE o0.value IN $d0"));
        assert!(!query.text.contains("sex"));
        assert!(!query.text.contains("LIMIT"));
        assert_eq!(param(&query, "d0"), Some(&Param::StrList(vec!["29".into(), "30".into()])));
        assert_eq!(query.mode, QueryMode::Rows);
    }

    #[test]
    fn test_unfiltered_stream_is_header_union_scan() {
        let query = render(&Statement::StreamCsvRows {
            instance_id: "inst".into(),
            dimensions: Vec::new(),
            limit: Some(10),
        });

        assert_eq!(
            query.text,
            "MATCH (i:`_inst_Instance`) RETURN i.header AS row UNION ALL MATCH (o:`_inst_observation`) \
             RETURN o.value AS row ORDER BY o.rowIndex LIMIT $limit"
        );
        assert_eq!(param(&query, "limit"), Some(&Param::Int(10)));
    }

    #[test]
    fn test_each_dimension_adds_a_match_clause() {
        let dims: Vec<SelectedDimension> = (0..3)
            .map(|n| SelectedDimension {
                name: format!("dim{n}"),
                options: vec!["x".into()],
            })
            .collect();
        let query = render(&Statement::StreamCsvRows {
            instance_id: "inst".into(),
            dimensions: dims,
            limit: None,
        });

        assert_eq!(query.text.matches("-[:isValueOf]->").count(), 3);
        assert!(param(&query, "d2").is_some());
    }

    #[test]
    fn test_list_literal_escapes_quotes() {
        assert_eq!(list_literal(&["it's".into()]), "['it\\'s']");
    }

    #[test]
    fn test_writes_report_affected_rows() {
        let statements = [
            Statement::CloneNodes {
                instance_id: "i".into(),
                dimension: "d".into(),
                code_list_id: "cl".into(),
            },
            Statement::MarkNodesToRemain {
                instance_id: "i".into(),
                dimension: "d".into(),
            },
            Statement::SetInstanceIsPublished { instance_id: "i".into() },
        ];
        for statement in &statements {
            let query = render(statement);
            assert_eq!(query.mode, QueryMode::Write, "{}", statement.name());
            assert!(query.text.ends_with("AS affected"), "{}", statement.name());
        }
    }

    #[test]
    fn test_clone_nodes_merges_by_code() {
        let query = render(&Statement::CloneNodes {
            instance_id: "i".into(),
            dimension: "geography".into(),
            code_list_id: "cl".into(),
        });
        assert!(query.text.contains("MERGE (n:`_hierarchy_node_i_geography` {code: g.code})"));
        assert!(query.text.contains("MERGE (n)-[:clone_of]->(g)"));
    }

    #[test]
    fn test_id_filters_only_when_ids_given() {
        let all = render(&Statement::SetNumberOfChildren {
            instance_id: "i".into(),
            dimension: "d".into(),
        });
        let some = render(&Statement::SetNumberOfChildrenFromIds {
            instance_id: "i".into(),
            dimension: "d".into(),
            ids: vec!["1".into()],
        });
        assert!(!all.text.contains("$ids"));
        assert!(some.text.contains("WHERE id(n) IN [x IN $ids | toInteger(x)]"));
        assert_eq!(param(&some, "ids"), Some(&Param::StrList(vec!["1".into()])));
    }

    #[test]
    fn test_insert_observations_binds_parallel_lists() {
        let query = render(&Statement::InsertObservations {
            instance_id: "i".into(),
            records: vec![ObservationRecord {
                value: "1,2".into(),
                row_index: 7,
                option_ids: vec!["11".into(), "12".into()],
            }],
        });
        assert_eq!(param(&query, "indexes"), Some(&Param::IntList(vec![7])));
        assert_eq!(
            param(&query, "option_ids"),
            Some(&Param::StrLists(vec![vec!["11".into(), "12".into()]]))
        );
    }

    #[test]
    fn test_constraints_are_schema_statements() {
        let query = render(&Statement::CreateDimensionConstraint {
            instance_id: "i".into(),
            dimension: "age".into(),
        });
        assert_eq!(query.mode, QueryMode::Schema);
        assert!(query.text.contains("`_i_age`"));
    }

    #[test]
    fn test_code_list_filter_uses_flag_label() {
        let query = render(&Statement::GetCodeLists {
            filter_by: Some("geography".into()),
        });
        assert!(query.text.starts_with("MATCH (cl:_code_list:`_geography`)"));
    }
}
