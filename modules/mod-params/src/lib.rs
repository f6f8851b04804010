use satrep_sdk::{
    ApiError, Clause, FacetDescriptor, GroupOutcome, Query, ReportContext, ReportError,
    ReportGenerator, ReportMetadata, register_report,
};
use serde_json::Value;

/// Groups hosts on the values of a host parameter, taking the candidate
/// values from a comma-separated global parameter.
struct ParameterReport;

impl ReportGenerator for ParameterReport {
    fn metadata(&self) -> ReportMetadata {
        ReportMetadata {
            id: "hosts_by_myparam",
            title: "Hosts by Custom Parameter",
            description: "Hosts grouped by a host parameter, values listed in a global parameter",
        }
    }

    fn generate(&self, ctx: &ReportContext<'_>) -> Result<Vec<GroupOutcome>, ReportError> {
        let settings = ctx.settings();
        let raw = global_parameter_value(ctx, &settings.global_parameter)?.ok_or_else(|| {
            ReportError::MissingInput(format!(
                "global parameter `{}` is not defined",
                settings.global_parameter
            ))
        })?;

        let values = split_values(&raw);
        if values.is_empty() {
            return Err(ReportError::MissingInput(format!(
                "global parameter `{}` lists no values",
                settings.global_parameter
            )));
        }

        tracing::debug!(
            parameter = %settings.global_parameter,
            values = ?values,
            "resolved parameter values"
        );

        let field = format!("params.{}", settings.host_parameter);
        let facets: Vec<FacetDescriptor> = values
            .into_iter()
            .map(|value| FacetDescriptor::matching(field.as_str(), value))
            .collect();

        ctx.aggregate_all(&facets)
    }
}

fn create_report() -> Box<dyn ReportGenerator> {
    Box::new(ParameterReport)
}

register_report!(create_report);

/// Value of the first global parameter named `name`, if any.
fn global_parameter_value(ctx: &ReportContext<'_>, name: &str) -> Result<Option<String>, ApiError> {
    let query = Query::foreman("common_parameters").with_search(Clause::eq("name", name));
    let results = ctx.client().fetch_page(&query)?;
    let value = match results.get(0).and_then(|item| item.get("value")) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };
    Ok(value)
}

fn split_values(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect()
}
