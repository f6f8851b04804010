use serde::Serialize;

use crate::query::{Clause, Filter};

/// One group to aggregate: the rendered label and the host search behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetDescriptor {
    pub label: String,
    pub filter: Filter,
}

impl FacetDescriptor {
    pub fn new<L: Into<String>, F: Into<Filter>>(label: L, filter: F) -> Self {
        Self {
            label: label.into(),
            filter: filter.into(),
        }
    }

    /// Hosts whose `field` equals `value`, labelled with the value itself.
    pub fn matching<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        let value = value.into();
        Self {
            filter: Filter::new(Clause::eq(field, value.as_str())),
            label: value,
        }
    }
}

/// Hosts sharing one facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetGroup {
    label: String,
    count: usize,
    hosts: Vec<String>,
}

impl FacetGroup {
    pub fn new<L: Into<String>>(label: L, hosts: Vec<String>) -> Self {
        // A lone empty name is the "nothing found" marker of the listing API.
        let hosts = if hosts.len() == 1 && hosts[0].is_empty() {
            Vec::new()
        } else {
            hosts
        };

        Self {
            label: label.into(),
            count: hosts.len(),
            hosts,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Result of aggregating one facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Ready(FacetGroup),
    Failed { label: String, error: String },
}

impl GroupOutcome {
    pub fn label(&self) -> &str {
        match self {
            GroupOutcome::Ready(group) => group.label(),
            GroupOutcome::Failed { label, .. } => label,
        }
    }

    pub fn group(&self) -> Option<&FacetGroup> {
        match self {
            GroupOutcome::Ready(group) => Some(group),
            GroupOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, GroupOutcome::Failed { .. })
    }
}

impl From<FacetGroup> for GroupOutcome {
    fn from(group: FacetGroup) -> Self {
        GroupOutcome::Ready(group)
    }
}
