use satrep_sdk::{
    ApiError, Clause, FacetDescriptor, Filter, GroupOutcome, Query, ReportContext, ReportError,
    ReportGenerator, ReportMetadata, register_report,
};
use serde::Deserialize;

const UNASSIGNED: &str = "Unassigned";
const USERGROUP: &str = "Usergroup";

struct UsergroupReport;

impl ReportGenerator for UsergroupReport {
    fn metadata(&self) -> ReportMetadata {
        ReportMetadata {
            id: "hosts_by_usergroup",
            title: "Hosts by User Group",
            description: "Hosts owned by each user group, plus hosts no group owns",
        }
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let usergroups = fetch_usergroups(ctx)?;
        tracing::debug!(usergroups = usergroups.len(), "resolved user groups");

        let mut facets: Vec<FacetDescriptor> = usergroups
            .iter()
            .map(|group| FacetDescriptor::new(group.name.as_str(), owner_filter(group.id)))
            .collect();
        facets.push(FacetDescriptor::new(
            UNASSIGNED,
            residual_filter(&ctx.settings().virt_host_pattern, &usergroups),
        ));

        ctx.aggregate_all(&facets)
    }
}

fn create_report() -> Box<dyn ReportGenerator> {
    Box::new(UsergroupReport)
}

register_report!(create_report);

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct Usergroup {
    id: u64,
    name: String,
}

fn fetch_usergroups(ctx: &ReportContext<'_>) -> Result<Vec<Usergroup>, ApiError> {
    let query = Query::foreman("usergroups").with_per_page(ctx.settings().per_page);
    let items = ctx.client().fetch_all(&query)?;
    serde_json::from_value(items).map_err(|err| ApiError::Decode {
        url: query.to_string(),
        message: err.to_string(),
    })
}

fn owner_filter(group_id: u64) -> Filter {
    Filter::new(Clause::eq("owner_type", USERGROUP))
        .and(Clause::eq("owner_id", group_id.to_string()))
}

/// Hosts owned by none of `usergroups`, virt-who reporters excluded.
/// Owner ids are compared only for group-owned hosts; user and group ids overlap.
fn residual_filter(virt_host_pattern: &str, usergroups: &[Usergroup]) -> Filter {
    let not_group_owned = Filter::new(Clause::not_like("name", virt_host_pattern))
        .and(Clause::not_eq("owner_type", USERGROUP));
    usergroups.iter().fold(
        not_group_owned.or(Clause::not_like("name", virt_host_pattern)),
        |filter, group| filter.and(Clause::not_eq("owner_id", group.id.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use satrep_sdk::ReportSettings;
    use satrep_sdk::testing::{TestHost, TestInventory, run_report, summarize};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn inventory() -> TestInventory {
        TestInventory::new()
            .with_collection(
                "api/v2/usergroups",
                vec![
                    json!({"id": 1, "name": "Web Team"}),
                    json!({"id": 2, "name": "DBA"}),
                ],
            )
            .with_host(TestHost::new(10, "web01").owned_by_usergroup(1))
            .with_host(TestHost::new(11, "web02").owned_by_usergroup(1))
            .with_host(TestHost::new(12, "db01").owned_by_usergroup(2))
            .with_host(TestHost::new(13, "jump01").owned_by_user(7))
            .with_host(TestHost::new(14, "lab01"))
            .with_host(TestHost::new(15, "virt-who-esx01-1").owned_by_user(7))
    }

    #[test]
    fn residual_filter_excludes_every_group() {
        let groups = vec![
            Usergroup { id: 1, name: "a".into() },
            Usergroup { id: 2, name: "b".into() },
        ];
        assert_eq!(
            residual_filter("virt-who%", &groups).to_string(),
            "name !~ virt-who% and owner_type != Usergroup \
             or name !~ virt-who% and owner_id != 1 and owner_id != 2"
        );
    }

    #[test]
    fn groups_then_unassigned() {
        let outcomes =
            run_report(&UsergroupReport, &inventory(), &ReportSettings::default()).unwrap();
        let summary = summarize(&outcomes);

        assert_eq!(
            summary,
            vec![
                ("Web Team".to_string(), vec!["web01".to_string(), "web02".to_string()]),
                ("DBA".to_string(), vec!["db01".to_string()]),
                ("Unassigned".to_string(), vec!["jump01".to_string(), "lab01".to_string()]),
            ]
        );
    }

    #[test]
    fn ownership_partitions_non_virt_hosts() {
        let outcomes =
            run_report(&UsergroupReport, &inventory(), &ReportSettings::default()).unwrap();

        let mut seen = BTreeSet::new();
        for outcome in &outcomes {
            let group = outcome.group().unwrap();
            assert_eq!(group.count(), group.hosts().len());
            for host in group.hosts() {
                assert!(seen.insert(host.clone()), "{} listed twice", host);
            }
        }

        let expected: BTreeSet<String> = ["web01", "web02", "db01", "jump01", "lab01"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn user_sharing_a_group_id_is_unassigned() {
        let inventory = TestInventory::new()
            .with_collection("api/v2/usergroups", vec![json!({"id": 1, "name": "A"})])
            .with_host(TestHost::new(10, "alpha").owned_by_usergroup(1))
            .with_host(TestHost::new(11, "userowned").owned_by_user(1))
            .with_host(TestHost::new(12, "other-group").owned_by_usergroup(2));
        let outcomes =
            run_report(&UsergroupReport, &inventory, &ReportSettings::default()).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![
                ("A".to_string(), vec!["alpha".to_string()]),
                (
                    "Unassigned".to_string(),
                    vec!["userowned".to_string(), "other-group".to_string()]
                ),
            ]
        );
    }

    #[test]
    fn empty_group_still_reported() {
        let inventory = TestInventory::new()
            .with_collection("api/v2/usergroups", vec![json!({"id": 5, "name": "Nobody"})])
            .with_host(TestHost::new(1, "lab01"));
        let outcomes =
            run_report(&UsergroupReport, &inventory, &ReportSettings::default()).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].group().unwrap().count(), 0);
        assert_eq!(outcomes[1].label(), "Unassigned");
    }

    #[test]
    fn listing_failure_is_fatal() {
        let inventory = inventory().failing_when("usergroups");
        let err = run_report(&UsergroupReport, &inventory, &ReportSettings::default()).unwrap_err();
        assert!(matches!(err, ReportError::Resolve(_)));
    }
}
