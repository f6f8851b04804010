//! Reports whose facets come straight from an inventory listing endpoint.

use satrep_sdk::{
    ApiRoot, Clause, FacetDescriptor, GroupOutcome, Query, ReportContext, ReportError,
    ReportGenerator, ReportMetadata, ReportSettings, register_report,
};

/// Lists facet values from `path` and groups hosts on `search_field`.
struct ListingReport {
    metadata: ReportMetadata,
    root: ApiRoot,
    path: &'static str,
    /// Katello listings are scoped to one organization.
    organization_scoped: bool,
    value_field: &'static str,
    search_field: &'static str,
    /// Model names and OS titles routinely contain blanks.
    quote_values: bool,
}

impl ListingReport {
    fn listing_query(&self, settings: &ReportSettings) -> Query {
        let query = Query::new(self.root, self.path).with_per_page(settings.per_page);
        if self.organization_scoped {
            query.with_param("organization_id", settings.organization_id)
        } else {
            query
        }
    }

    fn facet(&self, value: String) -> FacetDescriptor {
        let clause = Clause::eq(self.search_field, value.as_str());
        FacetDescriptor::new(value, if self.quote_values { clause.quoted() } else { clause })
    }
}

impl ReportGenerator for ListingReport {
    fn metadata(&self) -> ReportMetadata {
        self.metadata
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let query = self.listing_query(ctx.settings());
        let values = ctx.client().list_field(&query, self.value_field)?;
        tracing::debug!(report = self.metadata.id, facets = values.len(), "resolved facets");

        let facets: Vec<FacetDescriptor> =
            values.into_iter().map(|value| self.facet(value)).collect();

        ctx.aggregate_all(&facets)
    }
}

fn lifecycle_environments() -> ListingReport {
    ListingReport {
        metadata: ReportMetadata {
            id: "hosts_by_lifecycle_environment",
            title: "Hosts by Lifecycle Environment",
            description: "Content hosts grouped by Katello lifecycle environment",
        },
        root: ApiRoot::Katello,
        path: "environments",
        organization_scoped: true,
        value_field: "name",
        search_field: "lifecycle_environment",
        quote_values: false,
    }
}

fn environments() -> ListingReport {
    ListingReport {
        metadata: ReportMetadata {
            id: "hosts_by_environment",
            title: "Hosts by Environment",
            description: "Hosts grouped by Puppet environment",
        },
        root: ApiRoot::Foreman,
        path: "environments",
        organization_scoped: false,
        value_field: "name",
        search_field: "environment",
        quote_values: false,
    }
}

fn models() -> ListingReport {
    ListingReport {
        metadata: ReportMetadata {
            id: "hosts_by_model",
            title: "Hosts by Hardware Model",
            description: "Hosts grouped by hardware model",
        },
        root: ApiRoot::Foreman,
        path: "models",
        organization_scoped: false,
        value_field: "name",
        search_field: "model",
        quote_values: true,
    }
}

fn domains() -> ListingReport {
    ListingReport {
        metadata: ReportMetadata {
            id: "hosts_by_domain",
            title: "Hosts by Domain",
            description: "Hosts grouped by DNS domain",
        },
        root: ApiRoot::Foreman,
        path: "domains",
        organization_scoped: false,
        value_field: "name",
        search_field: "domain",
        quote_values: false,
    }
}

fn operating_systems() -> ListingReport {
    ListingReport {
        metadata: ReportMetadata {
            id: "hosts_by_operatingsystem",
            title: "Hosts by Operating System",
            description: "Hosts grouped by operating system title",
        },
        root: ApiRoot::Foreman,
        path: "operatingsystems",
        organization_scoped: false,
        value_field: "title",
        search_field: "os_title",
        quote_values: true,
    }
}

fn create_lifecycle_report() -> Box<dyn ReportGenerator> {
    Box::new(lifecycle_environments())
}

fn create_environment_report() -> Box<dyn ReportGenerator> {
    Box::new(environments())
}

fn create_model_report() -> Box<dyn ReportGenerator> {
    Box::new(models())
}

fn create_domain_report() -> Box<dyn ReportGenerator> {
    Box::new(domains())
}

fn create_os_report() -> Box<dyn ReportGenerator> {
    Box::new(operating_systems())
}

register_report!(create_lifecycle_report);
register_report!(create_environment_report);
register_report!(create_model_report);
register_report!(create_domain_report);
register_report!(create_os_report);

#[cfg(test)]
mod tests {
    use super::*;
    use satrep_sdk::testing::{TestHost, TestInventory, run_report, summarize};
    use serde_json::json;

    #[test]
    fn lifecycle_listing_is_scoped_to_organization() {
        let inventory = TestInventory::new()
            .with_collection(
                "katello/api/v2/environments",
                vec![json!({"id": 1, "name": "Library"}), json!({"id": 2, "name": "Prod"})],
            )
            .with_host(TestHost::new(1, "web01").with("lifecycle_environment", "Prod"));
        let settings = ReportSettings {
            organization_id: 3,
            ..ReportSettings::default()
        };

        let outcomes = run_report(&lifecycle_environments(), &inventory, &settings).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![
                ("Library".to_string(), vec![]),
                ("Prod".to_string(), vec!["web01".to_string()]),
            ]
        );
        assert!(
            inventory
                .requests()
                .iter()
                .any(|r| r.starts_with("katello/api/v2/environments?organization_id=3"))
        );
    }

    #[test]
    fn model_names_are_quoted() {
        let inventory = TestInventory::new()
            .with_collection("api/v2/models", vec![json!({"id": 4, "name": "PowerEdge R640"})])
            .with_host(TestHost::new(1, "db01").with("model", "PowerEdge R640"))
            .with_host(TestHost::new(2, "db02").with("model", "PowerEdge R740"));

        let outcomes = run_report(&models(), &inventory, &ReportSettings::default()).unwrap();
        assert_eq!(
            summarize(&outcomes),
            vec![("PowerEdge R640".to_string(), vec!["db01".to_string()])]
        );
        assert!(
            inventory
                .requests()
                .iter()
                .any(|r| r.ends_with("search=model = \"PowerEdge R640\""))
        );
    }

    #[test]
    fn operating_systems_use_titles() {
        let inventory = TestInventory::new()
            .with_collection(
                "api/v2/operatingsystems",
                vec![
                    json!({"id": 1, "name": "RedHat", "title": "RedHat 8.9"}),
                    json!({"id": 2, "name": "RedHat", "title": "RedHat 9.3"}),
                ],
            )
            .with_host(TestHost::new(1, "a").with("os_title", "RedHat 9.3"))
            .with_host(TestHost::new(2, "b").with("os_title", "RedHat 9.3"));

        let outcomes =
            run_report(&operating_systems(), &inventory, &ReportSettings::default()).unwrap();
        let counts: Vec<(String, usize)> = outcomes
            .iter()
            .map(|o| (o.label().to_string(), o.group().unwrap().count()))
            .collect();
        assert_eq!(
            counts,
            vec![("RedHat 8.9".to_string(), 0), ("RedHat 9.3".to_string(), 2)]
        );
    }

    #[test]
    fn domains_and_environments_use_plain_values() {
        let facet = domains().facet("example.com".into());
        assert_eq!(facet.filter.to_string(), "domain = example.com");
        let facet = environments().facet("production".into());
        assert_eq!(facet.label, "production");
        assert_eq!(facet.filter.to_string(), "environment = production");
    }

    #[test]
    fn listing_pages_are_followed() {
        let items: Vec<_> = (0..45)
            .map(|i| json!({"id": i, "name": format!("d{}.example", i)}))
            .collect();
        let inventory = TestInventory::new().with_collection("api/v2/domains", items);
        let settings = ReportSettings {
            per_page: 20,
            ..ReportSettings::default()
        };
        let outcomes = run_report(&domains(), &inventory, &settings).unwrap();
        assert_eq!(outcomes.len(), 45);
        assert_eq!(outcomes[44].label(), "d44.example");
    }

    #[test]
    fn empty_listing_gives_empty_report() {
        let inventory = TestInventory::new().with_collection("api/v2/environments", Vec::new());
        let outcomes = run_report(&environments(), &inventory, &ReportSettings::default()).unwrap();
        assert!(outcomes.is_empty());
    }
}
