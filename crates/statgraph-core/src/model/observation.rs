//! Observation and observation filter models.

use serde::{Deserialize, Serialize};

/// One dimension option an observation is a value of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationOption {
    pub dimension_name: String,
    pub option: String,
}

/// A data point parsed from one CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// The raw CSV row, without trailing newline.
    pub row: String,
    pub row_index: i64,
    pub dimension_options: Vec<ObservationOption>,
}

impl Observation {
    pub fn new(row: impl Into<String>, row_index: i64) -> Self {
        Self {
            row: row.into(),
            row_index,
            dimension_options: Vec::new(),
        }
    }

    pub fn with_option(mut self, dimension_name: impl Into<String>, option: impl Into<String>) -> Self {
        self.dimension_options.push(ObservationOption {
            dimension_name: dimension_name.into(),
            option: option.into(),
        });
        self
    }
}

/// Options selected for a single dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub name: String,
    pub options: Vec<String>,
}

impl DimensionFilter {
    pub fn new<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this dimension restricts the result at all.
    pub fn is_active(&self) -> bool {
        !self.name.is_empty() && !self.options.is_empty()
    }
}

/// A filter over observations: OR within a dimension, AND across dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilters {
    pub dimensions: Option<Vec<DimensionFilter>>,
}

impl DimensionFilters {
    pub fn new(dimensions: Vec<DimensionFilter>) -> Self {
        Self {
            dimensions: Some(dimensions),
        }
    }

    /// True unless some dimension has both a name and at least one option.
    pub fn is_empty(&self) -> bool {
        match &self.dimensions {
            None => true,
            Some(dims) => !dims.iter().any(DimensionFilter::is_active),
        }
    }

    /// The dimensions that actually restrict the result. Dimensions with no
    /// options are omitted, never treated as "match nothing".
    pub fn active(&self) -> Vec<&DimensionFilter> {
        self.dimensions
            .iter()
            .flatten()
            .filter(|d| d.is_active())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty_for_missing_dimensions() {
        assert!(DimensionFilters::default().is_empty());
        assert!(DimensionFilters::new(vec![]).is_empty());
    }

    #[test]
    fn test_is_empty_for_blank_dimensions() {
        let filters = DimensionFilters::new(vec![DimensionFilter::default(), DimensionFilter::default()]);
        assert!(filters.is_empty());

        let no_options = DimensionFilters::new(vec![DimensionFilter::new("age", Vec::<String>::new())]);
        assert!(no_options.is_empty());
    }

    #[test]
    fn test_not_empty_once_a_dimension_has_options() {
        let filters = DimensionFilters::new(vec![
            DimensionFilter::default(),
            DimensionFilter::new("age", ["29"]),
        ]);
        assert!(!filters.is_empty());
    }

    #[test]
    fn test_active_omits_dimensions_without_options() {
        let filters = DimensionFilters::new(vec![
            DimensionFilter::new("age", ["29", "30"]),
            DimensionFilter::new("sex", Vec::<String>::new()),
        ]);
        let active = filters.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "age");
        assert_eq!(active[0].options, vec!["29", "30"]);
    }
}
