//! Listener and route hostname intersection.
//!
//! A hostname is either exact (`foo.example.com`) or a wildcard whose first
//! label is `*` (`*.example.com`). A wildcard matches any hostname with at
//! least one additional label, but never its own apex.

/// Computes the hostnames a route serves on a listener.
///
/// Returns `None` when the listener has a hostname and none of the route's
/// hostnames intersect with it. A listener without a hostname accepts the
/// route's hostnames as is, and a route without hostnames inherits the
/// listener's.
pub fn matching_hostnames(listener: Option<&str>, route: &[String]) -> Option<Vec<String>> {
    let listener = match listener {
        None | Some("") => return Some(route.to_vec()),
        Some(listener) => listener,
    };

    if route.is_empty() {
        return Some(vec![listener.to_string()]);
    }

    let matches = route
        .iter()
        .filter_map(|h| intersect(listener, h))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if matches.is_empty() {
        return None;
    }
    Some(matches)
}

/// Returns the narrower of two hostnames if one covers the other.
pub fn intersect<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    if a == b {
        return Some(a);
    }

    match (wildcard_suffix(a), wildcard_suffix(b)) {
        (None, None) => None,
        (Some(suffix), None) => b.ends_with(suffix).then_some(b),
        (None, Some(suffix)) => a.ends_with(suffix).then_some(a),
        // Both are wildcards: the one with the longer suffix is narrower.
        (Some(sa), Some(sb)) if sa.len() >= sb.len() => sa.ends_with(sb).then_some(a),
        (Some(sa), Some(sb)) => sb.ends_with(sa).then_some(b),
    }
}

pub fn is_wildcard(hostname: &str) -> bool {
    wildcard_suffix(hostname).is_some()
}

/// For `*.example.com`, returns `.example.com`.
fn wildcard_suffix(hostname: &str) -> Option<&str> {
    hostname
        .strip_prefix('*')
        .filter(|suffix| suffix.starts_with('.'))
}
