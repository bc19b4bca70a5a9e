//! Read-only code list queries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use statgraph_core::model::{Code, CodeDataset, CodeList, DatasetEdition, Edition};
use statgraph_core::{GraphError, GraphResult};

use crate::cancel::CancelToken;
use crate::db::{require, GraphDb};
use crate::statement::Statement;
use crate::store::Row;

#[async_trait]
pub trait CodeListStore: Send + Sync {
    /// Code lists, optionally only those carrying the `filter_by` flag.
    async fn get_code_lists(&self, cancel: &CancelToken, filter_by: Option<&str>) -> GraphResult<Vec<CodeList>>;

    async fn get_code_list(&self, cancel: &CancelToken, code_list_id: &str) -> GraphResult<CodeList>;

    async fn get_editions(&self, cancel: &CancelToken, code_list_id: &str) -> GraphResult<Vec<Edition>>;

    async fn get_edition(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<Edition>;

    async fn count_codes(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<i64>;

    async fn get_codes(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<Vec<Code>>;

    async fn get_code(&self, cancel: &CancelToken, code_list_id: &str, edition: &str, code: &str) -> GraphResult<Code>;

    /// Published datasets using a code, one entry per dataset with the
    /// latest version of each edition.
    async fn get_code_datasets(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        edition: &str,
        code: &str,
    ) -> GraphResult<Vec<CodeDataset>>;

    async fn get_code_order(&self, cancel: &CancelToken, code_list_id: &str, code: &str) -> GraphResult<Option<i64>>;
}

fn edition_from_row(code_list_id: &str, row: &Row) -> GraphResult<Edition> {
    Ok(Edition {
        code_list_id: code_list_id.to_string(),
        edition: row.get_str("edition")?,
        label: row.get_opt_str("label")?.unwrap_or_default(),
    })
}

fn code_from_row(row: &Row) -> GraphResult<Code> {
    Ok(Code {
        code: row.get_str("code")?,
        label: row.get_opt_str("label")?.unwrap_or_default(),
    })
}

/// Group `(dataset, edition, version)` rows by dataset, keeping the highest
/// version seen for each edition. Output is ordered by dataset and edition.
pub fn group_code_datasets(rows: &[Row]) -> GraphResult<Vec<CodeDataset>> {
    let mut datasets: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for row in rows {
        let dataset_id = row.get_str("dataset_id")?;
        let edition = row.get_str("edition")?;
        let version = row.get_i64("version")?;

        let latest = datasets.entry(dataset_id).or_default().entry(edition).or_insert(version);
        if version > *latest {
            *latest = version;
        }
    }

    Ok(datasets
        .into_iter()
        .map(|(dataset_id, editions)| CodeDataset {
            dataset_id,
            editions: editions
                .into_iter()
                .map(|(edition, latest_version)| DatasetEdition { edition, latest_version })
                .collect(),
        })
        .collect())
}

#[async_trait]
impl CodeListStore for GraphDb {
    async fn get_code_lists(&self, cancel: &CancelToken, filter_by: Option<&str>) -> GraphResult<Vec<CodeList>> {
        let statement = Statement::GetCodeLists {
            filter_by: filter_by.filter(|f| !f.is_empty()).map(str::to_string),
        };
        self.read(cancel, &statement)
            .await?
            .iter()
            .map(|row| Ok(CodeList { id: row.get_str("id")? }))
            .collect()
    }

    async fn get_code_list(&self, cancel: &CancelToken, code_list_id: &str) -> GraphResult<CodeList> {
        require(code_list_id, "code list id")?;
        let statement = Statement::CodeListExists {
            code_list_id: code_list_id.to_string(),
        };
        if self.count(cancel, &statement).await? == 0 {
            return Err(GraphError::not_found(format!("code list '{}'", code_list_id)));
        }
        Ok(CodeList {
            id: code_list_id.to_string(),
        })
    }

    async fn get_editions(&self, cancel: &CancelToken, code_list_id: &str) -> GraphResult<Vec<Edition>> {
        require(code_list_id, "code list id")?;
        let statement = Statement::GetEditions {
            code_list_id: code_list_id.to_string(),
        };
        let rows = self.read(cancel, &statement).await?;
        if rows.is_empty() {
            return Err(GraphError::not_found(format!("editions of code list '{}'", code_list_id)));
        }
        rows.iter().map(|row| edition_from_row(code_list_id, row)).collect()
    }

    async fn get_edition(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<Edition> {
        require(code_list_id, "code list id")?;
        require(edition, "edition")?;
        let statement = Statement::GetEdition {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
        };
        let what = format!("edition '{}' of code list '{}'", edition, code_list_id);
        let row = self.read_one(cancel, &statement, &what).await?;
        edition_from_row(code_list_id, &row)
    }

    async fn count_codes(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<i64> {
        require(code_list_id, "code list id")?;
        require(edition, "edition")?;
        let statement = Statement::CountCodes {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
        };
        self.count(cancel, &statement).await
    }

    async fn get_codes(&self, cancel: &CancelToken, code_list_id: &str, edition: &str) -> GraphResult<Vec<Code>> {
        require(code_list_id, "code list id")?;
        require(edition, "edition")?;
        let statement = Statement::GetCodes {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
        };
        let rows = self.read(cancel, &statement).await?;
        if rows.is_empty() {
            return Err(GraphError::not_found(format!("codes of '{}' edition '{}'", code_list_id, edition)));
        }
        rows.iter().map(code_from_row).collect()
    }

    async fn get_code(&self, cancel: &CancelToken, code_list_id: &str, edition: &str, code: &str) -> GraphResult<Code> {
        require(code_list_id, "code list id")?;
        require(edition, "edition")?;
        require(code, "code")?;
        let statement = Statement::GetCode {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
            code: code.to_string(),
        };
        let row = self.read_one(cancel, &statement, &format!("code '{}'", code)).await?;
        code_from_row(&row)
    }

    async fn get_code_datasets(
        &self,
        cancel: &CancelToken,
        code_list_id: &str,
        edition: &str,
        code: &str,
    ) -> GraphResult<Vec<CodeDataset>> {
        require(code_list_id, "code list id")?;
        require(edition, "edition")?;
        require(code, "code")?;
        let statement = Statement::GetCodeDatasets {
            code_list_id: code_list_id.to_string(),
            edition: edition.to_string(),
            code: code.to_string(),
        };
        let rows = self.read(cancel, &statement).await?;
        group_code_datasets(&rows)
    }

    async fn get_code_order(&self, cancel: &CancelToken, code_list_id: &str, code: &str) -> GraphResult<Option<i64>> {
        require(code_list_id, "code list id")?;
        require(code, "code")?;
        let statement = Statement::GetCodeOrder {
            code_list_id: code_list_id.to_string(),
            code: code.to_string(),
        };
        let row = self.read_one(cancel, &statement, &format!("order of code '{}'", code)).await?;
        row.get_opt_i64("order")
    }
}
