use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::item::ItemBase;

/// Selects items for batch fan-out and the attributes exported per image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSchema {
    pub name: String,
    /// Attributes written to `metadata.json`, in order. Empty exports all of them.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl ItemSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, base: &ItemBase) -> bool {
        base.schema == self.name
    }

    pub fn select(&self, attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        if self.attributes.is_empty() {
            return attributes.clone();
        }
        self.attributes
            .iter()
            .filter_map(|name| {
                attributes
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    /// Attribute name to regular expression. `identifier` matches the item identifier.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// [`SearchParameters`] with every pattern compiled.
pub struct CompiledSearch {
    filters: Vec<(String, Regex)>,
    limit: Option<usize>,
}

impl SearchParameters {
    pub fn filter(mut self, attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters.insert(attribute.into(), pattern.into());
        self
    }

    pub fn compile(&self) -> Result<CompiledSearch> {
        let filters = self
            .filters
            .iter()
            .map(|(attribute, pattern)| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid filter for `{attribute}`: {pattern}"))
                    .map(|regex| (attribute.clone(), regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledSearch {
            filters,
            limit: self.limit,
        })
    }
}

impl CompiledSearch {
    /// An item without a filtered attribute does not match.
    pub fn matches(&self, identifier: &str, attributes: &BTreeMap<String, String>) -> bool {
        self.filters.iter().all(|(attribute, regex)| {
            let value = if attribute == "identifier" {
                Some(identifier)
            } else {
                attributes.get(attribute).map(String::as_str)
            };
            value.is_some_and(|value| regex.is_match(value))
        })
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}
