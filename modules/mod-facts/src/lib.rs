//! Reports grouping hosts on facts reported by the hosts themselves.

use satrep_sdk::{
    ApiError, Clause, FacetDescriptor, Filter, GroupOutcome, Query, ReportContext, ReportError,
    ReportGenerator, ReportMetadata, register_report,
};
use serde_json::Value;

const UPTIME_FACT: &str = "facts.system_uptime::days";
const SELINUX_MODES: [&str; 3] = ["enforcing", "permissive", "disabled"];

/// Groups hosts on every distinct value observed for one fact.
struct FactValuesReport {
    metadata: ReportMetadata,
    /// Fixed fact; `None` takes it from the invocation.
    fact: Option<&'static str>,
}

impl FactValuesReport {
    fn fact_name<'a>(&'a self, ctx: &'a ReportContext<'_>) -> Result<&'a str, ReportError> {
        let fact = match self.fact {
            Some(fact) => fact,
            None => ctx.settings().fact.as_deref().ok_or_else(|| {
                let message = format!("{} needs a fact name (--fact)", self.metadata.id);
                ReportError::MissingInput(message)
            })?,
        };

        if !is_valid_fact_name(fact) {
            return Err(ReportError::InvalidInput(format!("`{}` is not a valid fact name", fact)));
        }
        Ok(fact)
    }
}

impl ReportGenerator for FactValuesReport {
    fn metadata(&self) -> ReportMetadata {
        self.metadata
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let fact = self.fact_name(ctx)?;
        let query = Query::foreman("fact_values")
            .with_per_page(ctx.settings().per_page)
            .with_search(Clause::eq("fact", fact));
        let observed = ctx.client().fetch_all(&query)?;
        let values = distinct_fact_values(&observed).map_err(|message| ApiError::Decode {
            url: query.to_string(),
            message,
        })?;
        tracing::debug!(fact, values = values.len(), "discovered fact values");

        let field = format!("facts.{}", fact);
        let facets: Vec<FacetDescriptor> = values
            .into_iter()
            .map(|value| FacetDescriptor::matching(field.as_str(), value))
            .collect();

        ctx.aggregate_all(&facets)
    }
}

fn is_valid_fact_name(fact: &str) -> bool {
    !fact.is_empty()
        && fact
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'))
}

/// Flattens `{host: {fact: value}}` into distinct values, first-seen order.
fn distinct_fact_values(observed: &Value) -> Result<Vec<String>, String> {
    let hosts = observed
        .as_object()
        .ok_or_else(|| "expected a mapping of host to fact values".to_string())?;

    let mut values: Vec<String> = Vec::new();
    for facts in hosts.values() {
        let Some(facts) = facts.as_object() else {
            continue;
        };
        for value in facts.values() {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => continue,
            };
            if !values.contains(&text) {
                values.push(text);
            }
        }
    }
    Ok(values)
}

/// Half-open uptime range in days; `end == None` is the exact value `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeBucket {
    pub start: u64,
    pub end: Option<u64>,
}

impl UptimeBucket {
    pub const fn range(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub const fn exact(days: u64) -> Self {
        Self {
            start: days,
            end: None,
        }
    }

    pub fn contains(&self, days: u64) -> bool {
        match self.end {
            Some(end) => self.start <= days && days < end,
            None => days == self.start,
        }
    }

    pub fn label(&self) -> String {
        match self.end {
            Some(end) => format!("{}-{} days", self.start, end),
            None => format!("{} days", self.start),
        }
    }

    fn filter(&self) -> Filter {
        match self.end {
            Some(end) => Filter::new(Clause::at_least(UPTIME_FACT, self.start))
                .and(Clause::below(UPTIME_FACT, end)),
            None => Filter::new(Clause::eq(UPTIME_FACT, self.start.to_string())),
        }
    }
}

/// Ten 100-day buckets over `[0, 1000)` in descending order, then the finer
/// `[50,100)`, `[10,50)`, `[1,10)` and `{0}`.
///
/// The finer buckets sit inside `[0,100)`, so a host may be listed twice.
pub fn uptime_buckets() -> Vec<UptimeBucket> {
    let mut buckets: Vec<UptimeBucket> = (0..10u64)
        .rev()
        .map(|step| UptimeBucket::range(step * 100, step * 100 + 100))
        .collect();
    buckets.extend([
        UptimeBucket::range(50, 100),
        UptimeBucket::range(10, 50),
        UptimeBucket::range(1, 10),
        UptimeBucket::exact(0),
    ]);
    buckets
}

struct UptimeReport;

impl ReportGenerator for UptimeReport {
    fn metadata(&self) -> ReportMetadata {
        ReportMetadata {
            id: "hosts_by_fact_uptime_days",
            title: "Hosts by Uptime",
            description: "Hosts bucketed by days since last boot; empty buckets are omitted",
        }
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let facets: Vec<FacetDescriptor> = uptime_buckets()
            .iter()
            .map(|bucket| FacetDescriptor::new(bucket.label(), bucket.filter()))
            .collect();

        let mut outcomes = ctx.aggregate_all(&facets)?;
        outcomes.retain(|outcome| outcome.group().is_none_or(|group| !group.is_empty()));
        Ok(outcomes)
    }
}

struct SelinuxModeReport;

impl ReportGenerator for SelinuxModeReport {
    fn metadata(&self) -> ReportMetadata {
        ReportMetadata {
            id: "hosts_by_fact_selinux_current_mode",
            title: "Hosts by SELinux Mode",
            description: "Hosts grouped by current SELinux enforcement mode",
        }
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let facets: Vec<FacetDescriptor> = SELINUX_MODES
            .iter()
            .map(|mode| FacetDescriptor::matching("facts.selinux_current_mode", *mode))
            .collect();

        ctx.aggregate_all(&facets)
    }
}

fn create_java_version_report() -> Box<dyn ReportGenerator> {
    Box::new(FactValuesReport {
        metadata: ReportMetadata {
            id: "hosts_by_fact_java_version",
            title: "Hosts by Java Version",
            description: "Hosts grouped by the java_version fact",
        },
        fact: Some("java_version"),
    })
}

fn create_fact_report() -> Box<dyn ReportGenerator> {
    Box::new(FactValuesReport {
        metadata: ReportMetadata {
            id: "hosts_by_fact",
            title: "Hosts by Fact",
            description: "Hosts grouped by every value of the fact given with --fact",
        },
        fact: None,
    })
}

fn create_uptime_report() -> Box<dyn ReportGenerator> {
    Box::new(UptimeReport)
}

fn create_selinux_report() -> Box<dyn ReportGenerator> {
    Box::new(SelinuxModeReport)
}

register_report!(create_java_version_report);
register_report!(create_fact_report);
register_report!(create_uptime_report);
register_report!(create_selinux_report);

#[cfg(test)]
mod tests {
    use super::*;
    use satrep_sdk::ReportSettings;
    use satrep_sdk::testing::{TestHost, TestInventory, run_report, summarize};
    use serde_json::json;

    fn uptime_inventory() -> TestInventory {
        TestInventory::new()
            .with_host(TestHost::new(1, "old01").with_fact("system_uptime::days", 975))
            .with_host(TestHost::new(2, "mid01").with_fact("system_uptime::days", 75))
            .with_host(TestHost::new(3, "new01").with_fact("system_uptime::days", 0))
            .with_host(TestHost::new(4, "edge01").with_fact("system_uptime::days", 100))
    }

    fn labels_containing(outcomes: &[GroupOutcome], host: &str) -> Vec<String> {
        outcomes
            .iter()
            .filter(|o| o.group().is_some_and(|g| g.hosts().iter().any(|h| h == host)))
            .map(|o| o.label().to_string())
            .collect()
    }

    #[test]
    fn uptime_buckets_have_fixed_order() {
        let labels: Vec<String> = uptime_buckets().iter().map(UptimeBucket::label).collect();
        assert_eq!(
            labels,
            vec![
                "900-1000 days",
                "800-900 days",
                "700-800 days",
                "600-700 days",
                "500-600 days",
                "400-500 days",
                "300-400 days",
                "200-300 days",
                "100-200 days",
                "0-100 days",
                "50-100 days",
                "10-50 days",
                "1-10 days",
                "0 days",
            ]
        );
    }

    #[test]
    fn bucket_bounds_are_half_open() {
        let buckets = uptime_buckets();
        let holding = |days: u64| -> Vec<String> {
            buckets
                .iter()
                .filter(|b| b.contains(days))
                .map(UptimeBucket::label)
                .collect()
        };
        assert_eq!(holding(975), vec!["900-1000 days"]);
        assert_eq!(holding(75), vec!["0-100 days", "50-100 days"]);
        assert_eq!(holding(100), vec!["100-200 days"]);
        assert_eq!(holding(0), vec!["0-100 days", "0 days"]);
    }

    #[test]
    fn uptime_report_suppresses_empty_buckets() {
        let outcomes =
            run_report(&UptimeReport, &uptime_inventory(), &ReportSettings::default()).unwrap();
        let labels: Vec<&str> = outcomes.iter().map(GroupOutcome::label).collect();
        assert_eq!(
            labels,
            vec!["900-1000 days", "100-200 days", "0-100 days", "50-100 days", "0 days"]
        );
        assert_eq!(labels_containing(&outcomes, "old01"), vec!["900-1000 days"]);
        assert_eq!(labels_containing(&outcomes, "mid01"), vec!["0-100 days", "50-100 days"]);
    }

    #[test]
    fn uptime_filter_uses_range_operators() {
        assert_eq!(
            UptimeBucket::range(900, 1000).filter().to_string(),
            "facts.system_uptime::days >= 900 and facts.system_uptime::days < 1000"
        );
        assert_eq!(
            UptimeBucket::exact(0).filter().to_string(),
            "facts.system_uptime::days = 0"
        );
    }

    #[test]
    fn selinux_report_always_has_three_groups() {
        let inventory = TestInventory::new()
            .with_host(TestHost::new(1, "web01").with_fact("selinux_current_mode", "enforcing"));
        let outcomes =
            run_report(&SelinuxModeReport, &inventory, &ReportSettings::default()).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![
                ("enforcing".to_string(), vec!["web01".to_string()]),
                ("permissive".to_string(), vec![]),
                ("disabled".to_string(), vec![]),
            ]
        );

        let empty = run_report(
            &SelinuxModeReport,
            &TestInventory::new(),
            &ReportSettings::default(),
        )
        .unwrap();
        assert_eq!(empty.len(), 3);
    }

    #[test]
    fn fact_values_are_flattened_in_first_seen_order() {
        let observed = json!({
            "app01": {"java_version": "11.0.22"},
            "app02": {"java_version": "1.8.0_402"},
            "app03": {"java_version": "11.0.22"},
            "app04": {"java_version": 17},
        });
        assert_eq!(
            distinct_fact_values(&observed).unwrap(),
            vec!["11.0.22", "1.8.0_402", "17"]
        );
        assert!(distinct_fact_values(&json!([])).is_err());
    }

    #[test]
    fn java_version_report_groups_by_discovered_values() {
        let inventory = TestInventory::new()
            .with_body(
                "api/v2/fact_values",
                json!({
                    "total": 3,
                    "subtotal": 2,
                    "results": {
                        "app01": {"java_version": "11.0.22"},
                        "app02": {"java_version": "17.0.10"}
                    }
                }),
            )
            .with_host(TestHost::new(1, "app01").with_fact("java_version", "11.0.22"))
            .with_host(TestHost::new(2, "app02").with_fact("java_version", "17.0.10"))
            .with_host(TestHost::new(3, "web01"));

        let report = create_java_version_report();
        let outcomes = run_report(report.as_ref(), &inventory, &ReportSettings::default()).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![
                ("11.0.22".to_string(), vec!["app01".to_string()]),
                ("17.0.10".to_string(), vec!["app02".to_string()]),
            ]
        );
        assert!(
            inventory
                .requests()
                .iter()
                .any(|r| r.ends_with("search=fact = java_version"))
        );
    }

    #[test]
    fn generic_fact_report_requires_a_name() {
        let report = create_fact_report();
        let err = run_report(report.as_ref(), &TestInventory::new(), &ReportSettings::default())
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingInput(_)));

        let settings = ReportSettings {
            fact: Some("kernel release; drop".into()),
            ..ReportSettings::default()
        };
        let inventory = TestInventory::new();
        let err = run_report(report.as_ref(), &inventory, &settings).unwrap_err();
        assert!(matches!(err, ReportError::InvalidInput(_)));
        assert!(inventory.requests().is_empty());
    }

    #[test]
    fn generic_fact_report_uses_given_fact() {
        let inventory = TestInventory::new()
            .with_body(
                "api/v2/fact_values",
                json!({"results": {"db01": {"kernelrelease": "5.14.0-362"}}}),
            )
            .with_host(TestHost::new(1, "db01").with_fact("kernelrelease", "5.14.0-362"));
        let settings = ReportSettings {
            fact: Some("kernelrelease".into()),
            ..ReportSettings::default()
        };
        let report = create_fact_report();
        let outcomes = run_report(report.as_ref(), &inventory, &settings).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![("5.14.0-362".to_string(), vec!["db01".to_string()])]
        );
    }
}
