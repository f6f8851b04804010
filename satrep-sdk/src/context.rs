use rayon::ThreadPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::client::{ApiError, InventoryClient};
use crate::model::{FacetDescriptor, FacetGroup, GroupOutcome};
use crate::query::{Filter, Query};

/// What to do when a single facet cannot be aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole report.
    #[default]
    Abort,
    /// Keep going and render the facet as failed.
    Mark,
}

/// Report-level knobs shared by every generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub organization_id: u32,
    pub per_page: u32,
    pub hypervisor_per_page: u32,
    pub virt_host_pattern: String,
    pub hypervisor_prefix: String,
    pub global_parameter: String,
    pub host_parameter: String,
    pub errata_prefix: String,
    pub fact: Option<String>,
    pub failure_policy: FailurePolicy,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            organization_id: 1,
            per_page: 1000,
            hypervisor_per_page: 10000,
            virt_host_pattern: "virt-who%".to_string(),
            hypervisor_prefix: "virt-who-".to_string(),
            global_parameter: "myparams".to_string(),
            host_parameter: "myparam".to_string(),
            errata_prefix: "RH".to_string(),
            fact: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unknown report `{name}` (available: {known})")]
    UnknownReport { name: String, known: String },

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to resolve facets: {0}")]
    Resolve(#[from] ApiError),

    #[error("facet `{label}` failed: {source}")]
    Facet {
        label: String,
        #[source]
        source: ApiError,
    },
}

/// Everything a report generator may touch during one run.
pub struct ReportContext<'a> {
    client: &'a dyn InventoryClient,
    settings: &'a ReportSettings,
    pool: &'a ThreadPool,
}

impl<'a> ReportContext<'a> {
    pub fn new(
        client: &'a dyn InventoryClient,
        settings: &'a ReportSettings,
        pool: &'a ThreadPool,
    ) -> Self {
        Self {
            client,
            settings,
            pool,
        }
    }

    pub fn client(&self) -> &'a dyn InventoryClient {
        self.client
    }

    pub fn settings(&self) -> &'a ReportSettings {
        self.settings
    }

    /// Runs `task` for every item on the worker pool. Output order matches input order.
    pub fn fan_out<T, R, F>(&self, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(task).collect())
    }

    /// Names of the hosts matching `filter`.
    pub fn host_names(&self, filter: &Filter) -> Result<Vec<String>, ApiError> {
        let query = Query::foreman("hosts")
            .with_per_page(self.settings.per_page)
            .with_search(filter.clone());
        self.client.list_field(&query, "name")
    }

    pub fn aggregate(&self, label: &str, filter: &Filter) -> Result<FacetGroup, ApiError> {
        let hosts = self.host_names(filter)?;
        let group = FacetGroup::new(label, hosts);
        tracing::debug!(facet = label, hosts = group.count(), "aggregated facet");
        Ok(group)
    }

    /// Aggregates every facet concurrently and settles failures per policy.
    pub fn aggregate_all(
        &self,
        facets: &[FacetDescriptor],
    ) -> Result<Vec<GroupOutcome>, ReportError> {
        let results = self.fan_out(facets, |facet| self.aggregate(&facet.label, &facet.filter));

        facets
            .iter()
            .zip(results)
            .map(|(facet, result)| self.settle(&facet.label, result))
            .collect()
    }

    pub fn settle(
        &self,
        label: &str,
        result: Result<FacetGroup, ApiError>,
    ) -> Result<GroupOutcome, ReportError> {
        match result {
            Ok(group) => Ok(GroupOutcome::Ready(group)),
            Err(source) => match self.settings.failure_policy {
                FailurePolicy::Abort => Err(ReportError::Facet {
                    label: label.to_string(),
                    source,
                }),
                FailurePolicy::Mark => {
                    tracing::warn!(facet = label, error = %source, "facet marked as failed");
                    Ok(GroupOutcome::Failed {
                        label: label.to_string(),
                        error: source.to_string(),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestHost, TestInventory, test_pool};

    fn facets() -> Vec<FacetDescriptor> {
        ["prod", "dev", "qa"]
            .into_iter()
            .map(|env| FacetDescriptor::matching("environment", env))
            .collect()
    }

    fn inventory() -> TestInventory {
        TestInventory::new()
            .with_host(TestHost::new(1, "web01").with("environment", "prod"))
            .with_host(TestHost::new(2, "web02").with("environment", "prod"))
            .with_host(TestHost::new(3, "build01").with("environment", "dev"))
    }

    #[test]
    fn aggregate_all_keeps_facet_order() {
        let inventory = inventory();
        let settings = ReportSettings::default();
        let pool = test_pool();
        let ctx = ReportContext::new(&inventory, &settings, &pool);

        let outcomes = ctx.aggregate_all(&facets()).unwrap();
        let labels: Vec<&str> = outcomes.iter().map(GroupOutcome::label).collect();
        assert_eq!(labels, vec!["prod", "dev", "qa"]);
        let counts: Vec<usize> = outcomes
            .iter()
            .map(|o| o.group().map(FacetGroup::count).unwrap())
            .collect();
        assert_eq!(counts, vec![2, 1, 0]);
    }

    #[test]
    fn abort_policy_fails_the_report() {
        let inventory = inventory().failing_when("environment = dev");
        let settings = ReportSettings::default();
        let pool = test_pool();
        let ctx = ReportContext::new(&inventory, &settings, &pool);

        let err = ctx.aggregate_all(&facets()).unwrap_err();
        assert!(matches!(err, ReportError::Facet { ref label, .. } if label == "dev"));
    }

    #[test]
    fn mark_policy_keeps_other_facets() {
        let inventory = inventory().failing_when("environment = dev");
        let settings = ReportSettings {
            failure_policy: FailurePolicy::Mark,
            ..ReportSettings::default()
        };
        let pool = test_pool();
        let ctx = ReportContext::new(&inventory, &settings, &pool);

        let outcomes = ctx.aggregate_all(&facets()).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[1].is_failed());
        assert_eq!(outcomes[0].group().unwrap().count(), 2);
    }
}
