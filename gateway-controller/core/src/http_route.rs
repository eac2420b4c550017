use crate::{
    priority::{PathSpecificity, Specificity},
    rule::{self, quote},
};
use anyhow::Result;
pub use http::{header::HeaderName, Method};
use regex::Regex;

/// A validated HTTP request match. Every predicate must hold for a request to
/// match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRouteMatch {
    pub path: PathMatch,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
    pub method: Option<Method>,
}

#[derive(Clone, Debug)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

#[derive(Clone, Debug)]
pub enum HeaderMatch {
    Exact(HeaderName, String),
    Regex(HeaderName, Regex),
}

#[derive(Clone, Debug)]
pub enum QueryParamMatch {
    Exact(String, String),
    Regex(String, Regex),
}

// === impl HttpRouteMatch ===

impl Default for HttpRouteMatch {
    /// Matches every request.
    fn default() -> Self {
        Self {
            path: PathMatch::Prefix("/".to_string()),
            headers: vec![],
            query_params: vec![],
            method: None,
        }
    }
}

impl HttpRouteMatch {
    /// Renders the rule expression for this match on the given hostnames.
    pub fn rule(&self, hostnames: &[String]) -> String {
        let mut rules = Vec::new();
        rules.extend(rule::host_rule(hostnames));
        rules.push(self.path.rule());
        rules.extend(self.headers.iter().map(HeaderMatch::rule));
        rules.extend(self.query_params.iter().map(QueryParamMatch::rule));
        if let Some(method) = &self.method {
            rules.push(format!("Method({})", quote(method.as_str())));
        }
        rule::all_of(rules)
    }

    pub fn specificity(&self, hostnames: &[String]) -> Specificity {
        let exact_headers = self
            .headers
            .iter()
            .filter(|h| matches!(h, HeaderMatch::Exact(..)))
            .count();
        Specificity {
            path: self.path.specificity(),
            exact_headers,
            regex_headers: self.headers.len() - exact_headers,
            hostname_len: rule::hostname_len(hostnames),
        }
    }
}

// === impl PathMatch ===

impl PartialEq for PathMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(l0), Self::Exact(r0)) => l0 == r0,
            (Self::Prefix(l0), Self::Prefix(r0)) => l0 == r0,
            (Self::Regex(l0), Self::Regex(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for PathMatch {}

impl PathMatch {
    pub fn regex(s: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(s)?))
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::Prefix(_))
    }

    /// Prefixes match on path element boundaries: `/foo` matches `/foo` and
    /// `/foo/bar` but not `/foobar`.
    fn rule(&self) -> String {
        match self {
            Self::Exact(path) => format!("Path({})", quote(path)),
            Self::Prefix(prefix) => {
                let trimmed = prefix.trim_end_matches('/');
                if trimmed.is_empty() {
                    return format!("PathPrefix({})", quote("/"));
                }
                format!(
                    "(Path({}) || PathPrefix({}))",
                    quote(trimmed),
                    quote(&format!("{trimmed}/"))
                )
            }
            Self::Regex(re) => format!("PathRegexp({})", quote(re.as_str())),
        }
    }

    fn specificity(&self) -> PathSpecificity {
        match self {
            Self::Exact(path) => PathSpecificity::Exact { len: path.len() },
            Self::Prefix(prefix) if prefix.trim_end_matches('/').is_empty() => {
                PathSpecificity::CatchAll
            }
            Self::Prefix(prefix) => PathSpecificity::Prefix { len: prefix.len() },
            Self::Regex(re) => PathSpecificity::Regex {
                len: re.as_str().len(),
            },
        }
    }
}

// === impl HeaderMatch ===

impl PartialEq for HeaderMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for HeaderMatch {}

impl HeaderMatch {
    fn rule(&self) -> String {
        match self {
            Self::Exact(name, value) => {
                format!("Header({}, {})", quote(name.as_str()), quote(value))
            }
            Self::Regex(name, re) => {
                format!("HeaderRegexp({}, {})", quote(name.as_str()), quote(re.as_str()))
            }
        }
    }
}

// === impl QueryParamMatch ===

impl PartialEq for QueryParamMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for QueryParamMatch {}

impl QueryParamMatch {
    fn rule(&self) -> String {
        match self {
            Self::Exact(name, value) => format!("Query({}, {})", quote(name), quote(value)),
            Self::Regex(name, re) => {
                format!("QueryRegexp({}, {})", quote(name), quote(re.as_str()))
            }
        }
    }
}
