//! In-memory inventory for exercising report generators without a server.
//!
//! [`TestInventory`] answers `hosts` searches by evaluating the filter
//! expression against fixture hosts, serves `hosts/<id>` detail records, and
//! returns canned collections for every other endpoint.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::{Value, json};

use crate::client::{ApiError, InventoryClient};
use crate::context::{ReportContext, ReportError, ReportSettings};
use crate::model::GroupOutcome;
use crate::query::{ApiRoot, Clause, Filter, Operator, Query};
use crate::ReportGenerator;

const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Debug, Clone)]
pub struct TestHost {
    id: u64,
    name: String,
    attributes: BTreeMap<String, Vec<String>>,
    virtual_host: Option<String>,
}

impl TestHost {
    pub fn new<N: Into<String>>(id: u64, name: N) -> Self {
        let name = name.into();
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), vec![name.clone()]);
        Self {
            id,
            name,
            attributes,
            virtual_host: None,
        }
    }

    /// Adds a searchable value; repeated fields become multi-valued.
    pub fn with<F: Into<String>, V: ToString>(mut self, field: F, value: V) -> Self {
        self.attributes
            .entry(field.into())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_fact<V: ToString>(self, fact: &str, value: V) -> Self {
        self.with(format!("facts.{}", fact), value)
    }

    pub fn owned_by_usergroup(self, group_id: u64) -> Self {
        self.with("owner_type", "Usergroup").with("owner_id", group_id)
    }

    pub fn owned_by_user(self, user_id: u64) -> Self {
        self.with("owner_type", "User").with("owner_id", user_id)
    }

    pub fn guest_of<H: Into<String>>(mut self, hypervisor: H) -> Self {
        self.virtual_host = Some(hypervisor.into());
        self
    }

    fn matches(&self, filter: &Filter) -> bool {
        filter
            .alternatives()
            .iter()
            .any(|clauses| clauses.iter().all(|clause| self.satisfies(clause)))
    }

    fn satisfies(&self, clause: &Clause) -> bool {
        let values: &[String] = self
            .attributes
            .get(&clause.field)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let expected = clause.value.as_str();

        match clause.operator {
            Operator::Eq => values.iter().any(|v| v == expected),
            Operator::NotEq => values.iter().all(|v| v != expected),
            Operator::Like => values.iter().any(|v| like(expected, v)),
            Operator::NotLike => !values.iter().any(|v| like(expected, v)),
            Operator::GreaterOrEqual => compare(values, expected, |a, b| a >= b),
            Operator::Less => compare(values, expected, |a, b| a < b),
        }
    }

    fn summary(&self) -> Value {
        json!({ "id": self.id, "name": self.name })
    }

    fn detail(&self) -> Value {
        let virtual_host = match &self.virtual_host {
            Some(name) => json!({ "id": 9000 + self.id, "name": name }),
            None => Value::Null,
        };
        json!({
            "id": self.id,
            "name": self.name,
            "subscription_facet_attributes": { "virtual_host": virtual_host },
        })
    }
}

fn compare(values: &[String], expected: &str, op: impl Fn(f64, f64) -> bool) -> bool {
    let Ok(expected) = expected.parse::<f64>() else {
        return false;
    };
    values
        .iter()
        .filter_map(|v| v.parse::<f64>().ok())
        .any(|actual| op(actual, expected))
}

/// Case-insensitive `~` semantics: `%` is a wildcard, a pattern without one
/// matches anywhere in the text.
fn like(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('%') {
        return text.contains(&pattern);
    }

    let parts: Vec<&str> = pattern.split('%').collect();
    let last = parts.len() - 1;
    let mut rest = text.as_str();
    for (index, part) in parts.iter().enumerate() {
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if index == last {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

enum Fixture {
    Items(Vec<Value>),
    Body(Value),
}

#[derive(Default)]
pub struct TestInventory {
    hosts: Vec<TestHost>,
    fixtures: BTreeMap<String, Fixture>,
    failing: Vec<String>,
    requests: Mutex<Vec<String>>,
}

impl TestInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: TestHost) -> Self {
        self.hosts.push(host);
        self
    }

    /// Paginated collection served for `endpoint` (e.g. `api/v2/usergroups`).
    pub fn with_collection<E: Into<String>>(mut self, endpoint: E, items: Vec<Value>) -> Self {
        self.fixtures.insert(endpoint.into(), Fixture::Items(items));
        self
    }

    /// Body served verbatim for `endpoint`.
    pub fn with_body<E: Into<String>>(mut self, endpoint: E, body: Value) -> Self {
        self.fixtures.insert(endpoint.into(), Fixture::Body(body));
        self
    }

    /// Any request whose rendered form contains `fragment` gets an error payload.
    pub fn failing_when<S: Into<String>>(mut self, fragment: S) -> Self {
        self.failing.push(fragment.into());
        self
    }

    /// Rendered form of every request served so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn search_hosts(&self, query: &Query) -> Value {
        let items: Vec<Value> = self
            .hosts
            .iter()
            .filter(|host| query.filter().is_none_or(|filter| host.matches(filter)))
            .map(TestHost::summary)
            .collect();
        paginate(items, query)
    }

    fn host_detail(&self, id: &str) -> Value {
        self.hosts
            .iter()
            .find(|host| host.id.to_string() == id)
            .map(TestHost::detail)
            .unwrap_or_else(|| json!({ "error": { "message": format!("host {} not found", id) } }))
    }
}

fn paginate(items: Vec<Value>, query: &Query) -> Value {
    let total = items.len();
    let per_page = query.per_page().unwrap_or(DEFAULT_PER_PAGE).max(1) as usize;
    let page = query.page().unwrap_or(1).max(1) as usize;
    let results: Vec<Value> = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    json!({
        "total": total,
        "subtotal": total,
        "page": page,
        "per_page": per_page,
        "results": results,
    })
}

impl InventoryClient for TestInventory {
    fn get_json(&self, query: &Query) -> Result<Value, ApiError> {
        let rendered = query.to_string();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(rendered.clone());
        }

        if let Some(fragment) = self.failing.iter().find(|f| rendered.contains(f.as_str())) {
            return Ok(json!({ "error": { "message": format!("injected failure: {}", fragment) } }));
        }

        if query.root() == ApiRoot::Foreman {
            if query.path() == "hosts" {
                return Ok(self.search_hosts(query));
            }
            if let Some(id) = query.path().strip_prefix("hosts/") {
                return Ok(self.host_detail(id));
            }
        }

        match self.fixtures.get(&query.endpoint()) {
            Some(Fixture::Items(items)) => Ok(paginate(items.clone(), query)),
            Some(Fixture::Body(body)) => Ok(body.clone()),
            None => Ok(json!({
                "error": { "message": format!("no fixture for {}", query.endpoint()) }
            })),
        }
    }
}

/// Small pool so ordering bugs surface in tests.
pub fn test_pool() -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(3)
        .build()
        .expect("test thread pool")
}

/// Runs one generator against the inventory.
pub fn run_report(
    report: &dyn ReportGenerator,
    inventory: &TestInventory,
    settings: &ReportSettings,
) -> Result<Vec<GroupOutcome>, ReportError> {
    let pool = test_pool();
    let ctx = ReportContext::new(inventory, settings, &pool);
    report.generate(&ctx)
}

/// `(label, hosts)` of every ready group, failed ones as `(label, [])`.
pub fn summarize(outcomes: &[GroupOutcome]) -> Vec<(String, Vec<String>)> {
    outcomes
        .iter()
        .map(|outcome| {
            let hosts = outcome
                .group()
                .map(|group| group.hosts().to_vec())
                .unwrap_or_default();
            (outcome.label().to_string(), hosts)
        })
        .collect()
}
