mod client;
mod context;
mod model;
mod query;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ApiError, InventoryClient, check_error};
pub use context::{FailurePolicy, ReportContext, ReportError, ReportSettings};
pub use model::{FacetDescriptor, FacetGroup, GroupOutcome};
pub use query::{ApiRoot, Clause, Filter, Joiner, Operator, Query};

/// Report metadata used for dispatch, listing and rendering.
#[derive(Debug, Clone, Copy)]
pub struct ReportMetadata {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Common interface for report generators.
///
/// A generator resolves its facets and aggregates the hosts behind each one,
/// returning outcomes in the order they should be rendered.
pub trait ReportGenerator: Send + Sync + 'static {
    fn metadata(&self) -> ReportMetadata;
    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError>;
}

/// Descriptor of a compile-time registry entry.
pub struct ReportRegistration {
    pub constructor: fn() -> Box<dyn ReportGenerator>,
}

inventory::collect!(ReportRegistration);

pub use inventory;

/// Helper macro to register a report generator inside a module.
#[macro_export]
macro_rules! register_report {
    ($ctor:expr) => {
        ::satrep_sdk::inventory::submit! {
            ::satrep_sdk::ReportRegistration {
                constructor: $ctor,
            }
        }
    };
}

pub fn iter_registered_reports() -> impl Iterator<Item = &'static ReportRegistration> {
    inventory::iter::<ReportRegistration>.into_iter()
}

/// Metadata of every linked report, sorted by id.
pub fn registered_reports() -> Vec<ReportMetadata> {
    let mut reports: Vec<ReportMetadata> = iter_registered_reports()
        .map(|entry| (entry.constructor)().metadata())
        .collect();
    reports.sort_by(|a, b| a.id.cmp(b.id));
    reports
}

/// Looks a report up by its id; unknown ids never fall through to anything else.
pub fn find_report(id: &str) -> Result<Box<dyn ReportGenerator>, ReportError> {
    iter_registered_reports()
        .map(|entry| (entry.constructor)())
        .find(|report| report.metadata().id == id)
        .ok_or_else(|| ReportError::UnknownReport {
            name: id.to_string(),
            known: registered_reports()
                .iter()
                .map(|meta| meta.id)
                .collect::<Vec<_>>()
                .join(", "),
        })
}
