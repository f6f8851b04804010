use std::time::Instant;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Local};
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use url::Url;

mod client;
mod config;
pub mod schema;

pub use client::HttpInventoryClient;
pub use config::{Config, DEFAULT_CONFIG_PATH, ReportConfig};
pub use satrep_sdk::{
    FacetGroup, FailurePolicy, GroupOutcome, InventoryClient, ReportError, ReportGenerator,
    ReportMetadata, ReportSettings, find_report, registered_reports,
};

#[derive(Debug, Serialize)]
pub struct ReportInfo {
    pub report: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub generated_at: String,
    pub groups: usize,
    pub hosts: usize,
    pub failed: usize,
}

/// One rendered-ready report: groups in display order plus run metadata.
#[derive(Debug)]
pub struct Report {
    pub metadata: ReportInfo,
    pub groups: Vec<GroupOutcome>,
    generated_at: DateTime<Local>,
}

impl Report {
    pub fn new(metadata: ReportMetadata, groups: Vec<GroupOutcome>) -> Self {
        Self::with_timestamp(metadata, groups, Local::now())
    }

    pub fn with_timestamp(
        metadata: ReportMetadata,
        groups: Vec<GroupOutcome>,
        generated_at: DateTime<Local>,
    ) -> Self {
        let hosts = groups
            .iter()
            .filter_map(GroupOutcome::group)
            .map(FacetGroup::count)
            .sum();
        let failed = groups.iter().filter(|outcome| outcome.is_failed()).count();

        Self {
            metadata: ReportInfo {
                report: metadata.id,
                title: metadata.title,
                description: metadata.description,
                generated_at: generated_at.to_rfc3339(),
                groups: groups.len(),
                hosts,
                failed,
            },
            groups,
            generated_at,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.metadata.failed > 0
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "metadata": self.metadata,
            "groups": self.groups,
        })
    }

    /// Accordion document; host links point at `link_base`/hosts/<name>.
    pub fn to_html(&self, link_base: &Url) -> Result<String> {
        render::render_html(self, link_base).map_err(Into::into)
    }
}

/// Runs one generator on a dedicated worker pool of `workers` threads.
pub fn run_report(
    generator: &dyn ReportGenerator,
    client: &dyn InventoryClient,
    settings: &ReportSettings,
    workers: usize,
) -> Result<Report> {
    let metadata = generator.metadata();
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("satrep-worker-{}", index))
        .build()
        .context("failed to start worker pool")?;
    let ctx = satrep_sdk::ReportContext::new(client, settings, &pool);

    tracing::info!(report = metadata.id, workers, "generating report");
    let started = Instant::now();
    let groups = generator
        .generate(&ctx)
        .with_context(|| format!("report `{}` failed", metadata.id))?;
    tracing::info!(
        report = metadata.id,
        groups = groups.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "report ready"
    );

    Ok(Report::new(metadata, groups))
}

mod render {
    use askama::Template;
    use satrep_sdk::GroupOutcome;
    use url::Url;

    use super::Report;

    #[derive(Template)]
    #[template(path = "report.html")]
    struct HtmlReport<'a> {
        title: &'a str,
        generated_at: String,
        groups: Vec<GroupView>,
    }

    #[derive(Debug)]
    struct GroupView {
        header: String,
        failed: bool,
        error: String,
        hosts: Vec<HostLink>,
    }

    #[derive(Debug)]
    struct HostLink {
        name: String,
        href: String,
    }

    pub fn render_html(report: &Report, link_base: &Url) -> askama::Result<String> {
        HtmlReport {
            title: report.metadata.title,
            generated_at: report.generated_at.format("%Y-%m-%d %H:%M").to_string(),
            groups: report
                .groups
                .iter()
                .map(|outcome| group_view(outcome, link_base))
                .collect(),
        }
        .render()
    }

    fn group_view(outcome: &GroupOutcome, link_base: &Url) -> GroupView {
        match outcome {
            GroupOutcome::Ready(group) => GroupView {
                header: format!("{} ({})", group.label(), group.count()),
                failed: false,
                error: String::new(),
                hosts: group
                    .hosts()
                    .iter()
                    .map(|name| HostLink {
                        name: name.clone(),
                        href: host_href(link_base, name),
                    })
                    .collect(),
            },
            GroupOutcome::Failed { label, error } => GroupView {
                header: format!("{} (error)", label),
                failed: true,
                error: error.clone(),
                hosts: Vec::new(),
            },
        }
    }

    fn host_href(base: &Url, name: &str) -> String {
        let mut url = base.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("hosts").push(name);
        }
        url.to_string()
    }
}
