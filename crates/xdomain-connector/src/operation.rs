//! Directory operation types
//!
//! Structured search filters and returned entries. The transport renders
//! filters into its own wire format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{DistinguishedName, ScopeMode};

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create a NOT filter.
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// `(&(objectClass=<class>)(<attribute>=<value>))`.
    pub fn object_with(
        object_class: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Filter::and(vec![
            Filter::eq("objectClass", object_class),
            Filter::eq(attribute, value),
        ])
    }
}

/// A search issued against a connection.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Search base.
    pub base: DistinguishedName,
    pub scope: ScopeMode,
    pub filter: Filter,
    /// Attributes to return.
    pub attributes: Vec<String>,
    /// Maximum number of entries the server should return.
    pub size_limit: Option<u32>,
}

impl SearchRequest {
    /// Create a subtree search with no size limit.
    pub fn new(base: DistinguishedName, filter: Filter) -> Self {
        Self {
            base,
            scope: ScopeMode::Subtree,
            filter,
            attributes: Vec::new(),
            size_limit: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: ScopeMode) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| (*a).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_size_limit(mut self, limit: u32) -> Self {
        self.size_limit = Some(limit);
        self
    }
}

/// An object returned by the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry DN as returned by the server.
    pub dn: String,
    /// Attribute values keyed by attribute name as returned by the server.
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// All values of an attribute (attribute names are case-insensitive).
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}
