//! Router priorities.
//!
//! Priorities are additive scores. The path match selects a tier (catch-all,
//! regex, prefix, exact) and every tier is spaced further apart than the sum
//! of all bonuses a match can earn within a tier, so a more specific path
//! kind always outranks a less specific one regardless of headers or
//! hostnames.

/// Number of priority slots reserved per score for declaration-order
/// tie-breaking between the rules of a single route.
pub const RULE_SLOTS: i64 = 64;

const TIER: i64 = 1_000_000;

const PATH_CHAR_BONUS: i64 = 100;
const MAX_PATH_LEN: usize = 1024;

const EXACT_HEADER_BONUS: i64 = 100;
const REGEX_HEADER_BONUS: i64 = 10;
const MAX_HEADERS: usize = 16;

const MAX_HOSTNAME_LEN: usize = 253;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathSpecificity {
    /// A `/` prefix, matching every request.
    CatchAll,
    Regex { len: usize },
    Prefix { len: usize },
    Exact { len: usize },
}

/// The properties of a match that contribute to its priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Specificity {
    pub path: PathSpecificity,
    pub exact_headers: usize,
    pub regex_headers: usize,
    pub hostname_len: usize,
}

// === impl Specificity ===

impl Specificity {
    pub fn score(&self) -> i64 {
        let path = match self.path {
            PathSpecificity::CatchAll => 0,
            PathSpecificity::Regex { len } => TIER + path_bonus(len),
            PathSpecificity::Prefix { len } => 2 * TIER + path_bonus(len),
            PathSpecificity::Exact { len } => 3 * TIER + path_bonus(len),
        };
        let headers = self.exact_headers.min(MAX_HEADERS) as i64 * EXACT_HEADER_BONUS
            + self.regex_headers.min(MAX_HEADERS) as i64 * REGEX_HEADER_BONUS;
        let hostname = self.hostname_len.min(MAX_HOSTNAME_LEN) as i64;
        path + headers + hostname
    }

    /// Returns the router priority for the `idx`th of `count` rules declared
    /// by a route. Earlier rules win ties.
    pub fn priority(&self, idx: usize, count: usize) -> i64 {
        self.score() * RULE_SLOTS + tie_break(idx, count)
    }
}

fn path_bonus(len: usize) -> i64 {
    len.min(MAX_PATH_LEN) as i64 * PATH_CHAR_BONUS
}

fn tie_break(idx: usize, count: usize) -> i64 {
    let count = count.min(RULE_SLOTS as usize);
    if idx >= count {
        return 0;
    }
    (count - 1 - idx) as i64
}

/// Computes the priority of an SNI router: the summed length of its distinct
/// hostnames. A router without hostnames matches every SNI and gets 0.
pub fn sni_priority(hostnames: &[String]) -> i64 {
    let mut seen = std::collections::BTreeSet::new();
    hostnames
        .iter()
        .filter(|h| !h.is_empty() && h.as_str() != "*")
        .filter(|h| seen.insert(h.as_str()))
        .map(|h| h.len() as i64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(path: PathSpecificity) -> Specificity {
        Specificity {
            path,
            exact_headers: 0,
            regex_headers: 0,
            hostname_len: 0,
        }
    }

    fn maxed(path: PathSpecificity) -> Specificity {
        Specificity {
            path,
            exact_headers: MAX_HEADERS + 4,
            regex_headers: MAX_HEADERS + 4,
            hostname_len: MAX_HOSTNAME_LEN,
        }
    }

    #[rstest]
    #[case(PathSpecificity::Exact { len: 2 }, PathSpecificity::Prefix { len: 4096 })]
    #[case(PathSpecificity::Prefix { len: 2 }, PathSpecificity::Regex { len: 4096 })]
    #[case(PathSpecificity::Regex { len: 2 }, PathSpecificity::CatchAll)]
    fn tiers_dominate_bonuses(#[case] higher: PathSpecificity, #[case] lower: PathSpecificity) {
        assert!(spec(higher).priority(63, 64) > maxed(lower).priority(0, 64));
    }

    #[test]
    fn longer_prefix_wins() {
        let short = spec(PathSpecificity::Prefix { len: 4 });
        let long = spec(PathSpecificity::Prefix { len: 8 });
        assert!(long.priority(0, 1) > short.priority(0, 1));
    }

    #[test]
    fn exact_headers_outweigh_regex_headers() {
        let mut exact = spec(PathSpecificity::CatchAll);
        exact.exact_headers = 1;
        let mut regex = spec(PathSpecificity::CatchAll);
        regex.regex_headers = 1;
        assert!(exact.score() > regex.score());
        assert!(regex.score() > spec(PathSpecificity::CatchAll).score());
    }

    #[test]
    fn earlier_rules_win_ties() {
        let s = spec(PathSpecificity::Prefix { len: 1 });
        assert!(s.priority(0, 3) > s.priority(1, 3));
        assert!(s.priority(1, 3) > s.priority(2, 3));
        assert_eq!(s.priority(0, 1), s.score() * RULE_SLOTS);
        // Rules past the reserved slots share the lowest slot.
        assert_eq!(s.priority(100, 200), s.score() * RULE_SLOTS);
    }

    #[test]
    fn sni_priority_sums_distinct_hostnames() {
        assert_eq!(sni_priority(&[]), 0);
        assert_eq!(sni_priority(&["*".to_string()]), 0);
        assert_eq!(
            sni_priority(&[
                "foo.com".to_string(),
                "foo.com".to_string(),
                "*.bar.com".to_string()
            ]),
            16
        );
    }
}
