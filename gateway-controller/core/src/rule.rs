//! Synthesis of data plane rule expressions and router names.

use crate::hostname;
use sha2::{Digest, Sha256};

const KEY_HASH_LEN: usize = 10;

/// Quotes a rule argument with double quotes.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Builds the host part of an HTTP rule. Returns `None` when the router
/// should match any host.
pub fn host_rule(hostnames: &[String]) -> Option<String> {
    let rules = hostnames
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| match h.strip_prefix("*.") {
            Some(suffix) => format!("HostRegexp({})", quote(&wildcard_regex(suffix))),
            None => format!("Host({})", quote(h)),
        })
        .collect::<Vec<_>>();
    any_of(rules)
}

/// Builds an SNI rule. Without hostnames, every SNI (including none) matches.
pub fn sni_rule(hostnames: &[String]) -> String {
    let rules = hostnames
        .iter()
        .filter(|h| !h.is_empty() && h.as_str() != "*")
        .map(|h| match h.strip_prefix("*.") {
            Some(suffix) => format!("HostSNIRegexp({})", quote(&wildcard_regex(suffix))),
            None => format!("HostSNI({})", quote(h)),
        })
        .collect::<Vec<_>>();
    any_of(rules).unwrap_or_else(|| format!("HostSNI({})", quote("*")))
}

/// `*.example.com` matches one or more labels in front of `example.com`.
fn wildcard_regex(suffix: &str) -> String {
    format!(r"^[a-z0-9-\.]+\.{}$", regex::escape(suffix))
}

/// Joins expressions with `||`, parenthesized when there is more than one.
pub fn any_of(mut rules: Vec<String>) -> Option<String> {
    match rules.len() {
        0 => None,
        1 => rules.pop(),
        _ => Some(format!("({})", rules.join(" || "))),
    }
}

/// Joins expressions with `&&`.
pub fn all_of(rules: impl IntoIterator<Item = String>) -> String {
    rules.into_iter().collect::<Vec<_>>().join(" && ")
}

/// Returns the length of the longest hostname a rule matches, not counting a
/// leading wildcard. Used as the hostname bonus of a router's priority.
pub fn hostname_len(hostnames: &[String]) -> usize {
    hostnames
        .iter()
        .map(|h| {
            if hostname::is_wildcard(h) {
                h.len() - 1
            } else {
                h.len()
            }
        })
        .max()
        .unwrap_or(0)
}

/// Identifies the objects a router is derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterKey<'a> {
    pub route_kind: &'a str,
    pub route_namespace: &'a str,
    pub route_name: &'a str,
    pub gateway_namespace: &'a str,
    pub gateway_name: &'a str,
    pub entry_point: &'a str,
}

impl RouterKey<'_> {
    /// Builds the name of the router for the `idx`th rule (or match) of a
    /// route. The rule expression is hashed into the name so that two matches
    /// with identical identifiers but different expressions stay distinct.
    pub fn name(&self, idx: usize, rule: &str) -> String {
        let digest = hex::encode(Sha256::digest(rule.as_bytes()));
        let key = format!(
            "{}-{}-{}-gw-{}-{}-ep-{}-{}-{}",
            self.route_kind.to_lowercase(),
            self.route_namespace,
            self.route_name,
            self.gateway_namespace,
            self.gateway_name,
            self.entry_point,
            idx,
            &digest[..KEY_HASH_LEN],
        );
        normalize(&key)
    }
}

/// Replaces every character that is not an ASCII alphanumeric or `-` with `-`.
pub fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
