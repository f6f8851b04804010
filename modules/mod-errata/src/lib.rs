//! Critical errata reports: one group per erratum, listing the hosts it applies to.

use satrep_sdk::{
    Clause, FacetDescriptor, Filter, GroupOutcome, Query, ReportContext, ReportError,
    ReportGenerator, ReportMetadata, ReportSettings, register_report,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restriction {
    Applicable,
    Installable,
}

impl Restriction {
    fn param(self) -> &'static str {
        match self {
            Restriction::Applicable => "errata_restrict_applicable",
            Restriction::Installable => "errata_restrict_installable",
        }
    }
}

struct CriticalErrataReport {
    metadata: ReportMetadata,
    restriction: Restriction,
}

impl CriticalErrataReport {
    fn errata_query(&self, settings: &ReportSettings) -> Query {
        let search = Filter::new(Clause::like("id", format!("{}%", settings.errata_prefix)))
            .and(Clause::eq("severity", "Critical"));
        Query::katello("errata")
            .with_param("order", "issued desc")
            .with_param("organization_id", settings.organization_id)
            .with_param(self.restriction.param(), true)
            .with_per_page(settings.per_page)
            .with_search(search)
    }
}

impl ReportGenerator for CriticalErrataReport {
    fn metadata(&self) -> ReportMetadata {
        self.metadata
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let errata = ctx
            .client()
            .list_field(&self.errata_query(ctx.settings()), "errata_id")?;
        tracing::debug!(restriction = ?self.restriction, errata = errata.len(), "resolved errata");

        // Both variants match hosts on applicability.
        let facets: Vec<FacetDescriptor> = errata
            .into_iter()
            .map(|id| FacetDescriptor::matching("applicable_errata", id))
            .collect();

        ctx.aggregate_all(&facets)
    }
}

fn create_applicable_report() -> Box<dyn ReportGenerator> {
    Box::new(CriticalErrataReport {
        metadata: ReportMetadata {
            id: "hosts_by_errata_critical_applicable",
            title: "Hosts by Applicable Critical Errata",
            description: "Critical errata applicable to content hosts, newest first",
        },
        restriction: Restriction::Applicable,
    })
}

fn create_installable_report() -> Box<dyn ReportGenerator> {
    Box::new(CriticalErrataReport {
        metadata: ReportMetadata {
            id: "hosts_by_errata_critical_installable",
            title: "Hosts by Installable Critical Errata",
            description: "Critical errata installable from content views, newest first",
        },
        restriction: Restriction::Installable,
    })
}

register_report!(create_applicable_report);
register_report!(create_installable_report);
