//! Schema of the `--format json` output, embedded at build time.

use once_cell::sync::Lazy;
use serde_json::Value;

pub const REPORT_SCHEMA_JSON: &str = include_str!("../../schemas/satrep-report.schema.json");

static REPORT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(REPORT_SCHEMA_JSON).expect("embedded report schema is valid JSON")
});

pub fn report_schema() -> &'static Value {
    &REPORT_SCHEMA
}
