use std::fmt;

use url::Url;

/// Comparison operators understood by the inventory search language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Like,
    NotLike,
    GreaterOrEqual,
    Less,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Like => "~",
            Operator::NotLike => "!~",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    And,
    Or,
}

/// A single `field operator value` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: String,
    pub operator: Operator,
    pub value: String,
    quoted: bool,
}

impl Clause {
    pub fn new<F: Into<String>, V: Into<String>>(field: F, operator: Operator, value: V) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            quoted: false,
        }
    }

    pub fn eq<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn not_eq<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::new(field, Operator::NotEq, value)
    }

    pub fn like<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::new(field, Operator::Like, value)
    }

    pub fn not_like<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::new(field, Operator::NotLike, value)
    }

    pub fn at_least<F: Into<String>>(field: F, value: u64) -> Self {
        Self::new(field, Operator::GreaterOrEqual, value.to_string())
    }

    pub fn below<F: Into<String>>(field: F, value: u64) -> Self {
        Self::new(field, Operator::Less, value.to_string())
    }

    /// Forces the literal into double quotes even when it contains no blanks.
    pub fn quoted(mut self) -> Self {
        self.quoted = true;
        self
    }

    fn literal(&self) -> String {
        if self.quoted || needs_quoting(&self.value) {
            let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        } else {
            self.value.clone()
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.literal())
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '(' | ')'))
}

/// Search expression composed of clauses joined by `and` / `or`.
///
/// Rendering goes through [`fmt::Display`]; percent-encoding happens once, when
/// the owning [`Query`] is turned into a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    head: Clause,
    tail: Vec<(Joiner, Clause)>,
}

impl Filter {
    pub fn new(clause: Clause) -> Self {
        Self {
            head: clause,
            tail: Vec::new(),
        }
    }

    pub fn and(mut self, clause: Clause) -> Self {
        self.tail.push((Joiner::And, clause));
        self
    }

    pub fn or(mut self, clause: Clause) -> Self {
        self.tail.push((Joiner::Or, clause));
        self
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        std::iter::once(&self.head).chain(self.tail.iter().map(|(_, clause)| clause))
    }

    /// Splits the expression on `or`, `and` binding tighter.
    pub fn alternatives(&self) -> Vec<Vec<&Clause>> {
        let mut groups = vec![vec![&self.head]];
        for (joiner, clause) in &self.tail {
            match joiner {
                Joiner::And => {
                    if let Some(current) = groups.last_mut() {
                        current.push(clause);
                    }
                }
                Joiner::Or => groups.push(vec![clause]),
            }
        }
        groups
    }
}

impl From<Clause> for Filter {
    fn from(clause: Clause) -> Self {
        Filter::new(clause)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for (joiner, clause) in &self.tail {
            let word = match joiner {
                Joiner::And => "and",
                Joiner::Or => "or",
            };
            write!(f, " {} {}", word, clause)?;
        }
        Ok(())
    }
}

/// API namespaces exposed by the inventory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRoot {
    Foreman,
    Katello,
}

impl ApiRoot {
    pub fn prefix(&self) -> &'static str {
        match self {
            ApiRoot::Foreman => "api/v2/",
            ApiRoot::Katello => "katello/api/v2/",
        }
    }
}

/// Read request against one inventory endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    root: ApiRoot,
    path: String,
    params: Vec<(String, String)>,
    filter: Option<Filter>,
    per_page: Option<u32>,
    page: Option<u32>,
}

impl Query {
    pub fn new<P: Into<String>>(root: ApiRoot, path: P) -> Self {
        Self {
            root,
            path: path.into(),
            params: Vec::new(),
            filter: None,
            per_page: None,
            page: None,
        }
    }

    pub fn foreman<P: Into<String>>(path: P) -> Self {
        Self::new(ApiRoot::Foreman, path)
    }

    pub fn katello<P: Into<String>>(path: P) -> Self {
        Self::new(ApiRoot::Katello, path)
    }

    pub fn with_param<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn with_search<F: Into<Filter>>(mut self, filter: F) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn root(&self) -> ApiRoot {
        self.root
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn per_page(&self) -> Option<u32> {
        self.per_page
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Endpoint location relative to the server root, e.g. `api/v2/hosts`.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.root.prefix(), self.path)
    }

    fn pairs(&self) -> Vec<(&str, String)> {
        let mut pairs: Vec<(&str, String)> = self
            .params
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("search", filter.to_string()));
        }
        pairs
    }

    /// Resolves the query against the server base URL, encoding every parameter.
    pub fn to_url(&self, base: &Url) -> Result<Url, url::ParseError> {
        let mut url = base.join(&self.endpoint())?;
        let pairs = self.pairs();
        if !pairs.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint())?;
        let pairs = self.pairs();
        for (index, (key, value)) in pairs.iter().enumerate() {
            let sep = if index == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}
