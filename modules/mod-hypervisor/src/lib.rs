//! Guests grouped under the hypervisor that reports them.
//!
//! The guest/hypervisor relation is only exposed on each host's detail
//! record, so every candidate host is fetched individually on the worker
//! pool before grouping.

use satrep_sdk::{
    ApiError, Clause, FacetGroup, FailurePolicy, Filter, GroupOutcome, Query, ReportContext,
    ReportError, ReportGenerator, ReportMetadata, register_report,
};
use serde::Deserialize;
use serde_json::Value;

const VIRTUAL_HOST_NAME: &str = "/subscription_facet_attributes/virtual_host/name";
const UNRESOLVED: &str = "Unresolved guests";

struct HypervisorReport;

#[derive(Debug, Clone, Deserialize)]
struct HostSummary {
    id: u64,
    name: String,
}

/// Guest name plus the hypervisor it reports, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placement {
    guest: String,
    hypervisor: Option<String>,
}

impl ReportGenerator for HypervisorReport {
    fn metadata(&self) -> ReportMetadata {
        ReportMetadata {
            id: "hosts_by_hypervisor",
            title: "Hosts by Hypervisor",
            description: "Virtual guests grouped under their reporting hypervisor",
        }
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let settings = ctx.settings();
        let candidates = fetch_candidates(ctx)?;
        tracing::debug!(hosts = candidates.len(), "fetching host details");

        let details = ctx.fan_out(&candidates, |host| fetch_placement(ctx, host));

        let mut placements = Vec::with_capacity(details.len());
        let mut unresolved = Vec::new();
        for (host, detail) in candidates.iter().zip(details) {
            match detail {
                Ok(placement) => placements.push(placement),
                Err(source) => match settings.failure_policy {
                    FailurePolicy::Abort => {
                        return Err(ReportError::Facet {
                            label: host.name.clone(),
                            source,
                        });
                    }
                    FailurePolicy::Mark => {
                        tracing::warn!(
                            host = %host.name,
                            error = %source,
                            "host detail unavailable"
                        );
                        unresolved.push(format!("{}: {}", host.name, source));
                    }
                },
            }
        }

        let mut outcomes: Vec<GroupOutcome> =
            group_by_hypervisor(placements, &settings.hypervisor_prefix)
                .into_iter()
                .map(GroupOutcome::Ready)
                .collect();
        if !unresolved.is_empty() {
            outcomes.push(GroupOutcome::Failed {
                label: UNRESOLVED.to_string(),
                error: unresolved.join("; "),
            });
        }
        Ok(outcomes)
    }
}

fn create_report() -> Box<dyn ReportGenerator> {
    Box::new(HypervisorReport)
}

register_report!(create_report);

fn fetch_candidates(ctx: &ReportContext<'_>) -> Result<Vec<HostSummary>, ApiError> {
    let settings = ctx.settings();
    let query = Query::foreman("hosts")
        .with_per_page(settings.hypervisor_per_page)
        .with_search(Filter::new(Clause::not_like(
            "name",
            settings.virt_host_pattern.as_str(),
        )));
    let items = ctx.client().fetch_all(&query)?;
    serde_json::from_value(items).map_err(|err| ApiError::Decode {
        url: query.to_string(),
        message: err.to_string(),
    })
}

fn fetch_placement(ctx: &ReportContext<'_>, host: &HostSummary) -> Result<Placement, ApiError> {
    let detail = ctx
        .client()
        .fetch_page(&Query::foreman(format!("hosts/{}", host.id)))?;
    Ok(placement_from_detail(&detail, &host.name))
}

fn placement_from_detail(detail: &Value, listed_name: &str) -> Placement {
    let guest = detail
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(listed_name)
        .to_string();
    let hypervisor = detail
        .pointer(VIRTUAL_HOST_NAME)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(ToOwned::to_owned);
    Placement { guest, hypervisor }
}

/// Groups in first-seen order; guests without a hypervisor are dropped.
fn group_by_hypervisor(placements: Vec<Placement>, prefix: &str) -> Vec<FacetGroup> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for Placement { guest, hypervisor } in placements {
        let Some(hypervisor) = hypervisor else {
            continue;
        };
        match groups.iter_mut().find(|(name, _)| *name == hypervisor) {
            Some((_, guests)) => guests.push(guest),
            None => groups.push((hypervisor, vec![guest])),
        }
    }

    groups
        .into_iter()
        .map(|(hypervisor, guests)| {
            let label = hypervisor.strip_prefix(prefix).unwrap_or(&hypervisor);
            FacetGroup::new(label, guests)
        })
        .collect()
}
