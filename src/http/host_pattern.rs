//! Host patterns and ranked matching
//!
//! Precedence: exact host > deepest wildcard > shallower wildcard > default.
//! `*.example.com` matches any subdomain of `example.com` but not
//! `example.com` itself; a bare `*` matches every host at the lowest rank.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    /// Suffix after `*.`, empty for the catch-all `*`
    Wildcard(String),
}

/// How specifically a pattern matched; larger is more specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    /// Number of labels in the matched wildcard suffix
    Wildcard(usize),
    Exact,
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
        if pattern == "*" {
            HostPattern::Wildcard(String::new())
        } else if let Some(suffix) = pattern.strip_prefix("*.") {
            HostPattern::Wildcard(suffix.to_string())
        } else {
            HostPattern::Exact(pattern)
        }
    }

    /// Rank of this pattern against an already lowercased host, if it matches
    pub fn rank(&self, host: &str) -> Option<MatchRank> {
        match self {
            HostPattern::Exact(expected) => (expected == host).then_some(MatchRank::Exact),
            HostPattern::Wildcard(suffix) if suffix.is_empty() => Some(MatchRank::Wildcard(0)),
            HostPattern::Wildcard(suffix) => host
                .strip_suffix(suffix.as_str())
                .filter(|head| head.len() > 1 && head.ends_with('.'))
                .map(|_| MatchRank::Wildcard(suffix.split('.').count())),
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Exact(host) => f.write_str(host),
            HostPattern::Wildcard(suffix) if suffix.is_empty() => f.write_str("*"),
            HostPattern::Wildcard(suffix) => write!(f, "*.{}", suffix),
        }
    }
}

/// Pick the entry whose pattern matches `host` most specifically
///
/// Ties keep the earliest entry. `host` is compared case-insensitively.
pub fn best_match<'a, T>(host: &str, entries: &'a [(HostPattern, T)]) -> Option<&'a T> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let mut best: Option<(MatchRank, &T)> = None;
    for (pattern, value) in entries {
        if let Some(rank) = pattern.rank(&host) {
            if best.as_ref().is_none_or(|(current, _)| rank > *current) {
                best = Some((rank, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entries() -> Vec<(HostPattern, &'static str)> {
        vec![
            (HostPattern::parse("*.org"), "org"),
            (HostPattern::parse("*.nuget.org"), "nuget"),
            (HostPattern::parse("api.nuget.org"), "api"),
            (HostPattern::parse("*.cdn.nuget.org"), "cdn"),
            (HostPattern::parse("10.0.0.1"), "ip"),
        ]
    }

    #[rstest]
    #[case("api.nuget.org", Some("api"))]
    #[case("API.NuGet.ORG", Some("api"))]
    #[case("www.nuget.org", Some("nuget"))]
    #[case("eu.cdn.nuget.org", Some("cdn"))]
    #[case("cdn.nuget.org", Some("nuget"))]
    #[case("nuget.org", Some("org"))]
    #[case("example.org", Some("org"))]
    #[case("org", None)]
    #[case("example.com", None)]
    #[case("10.0.0.1", Some("ip"))]
    #[case("10.0.0.2", None)]
    #[case("evilnuget.org", Some("org"))]
    fn picks_most_specific_pattern(#[case] host: &str, #[case] expected: Option<&str>) {
        assert_eq!(best_match(host, &entries()).copied(), expected);
    }

    #[test]
    fn catch_all_ranks_below_everything() {
        let entries = vec![
            (HostPattern::parse("*"), "any"),
            (HostPattern::parse("*.example.com"), "example"),
        ];
        assert_eq!(best_match("a.example.com", &entries), Some(&"example"));
        assert_eq!(best_match("other.net", &entries), Some(&"any"));
    }

    #[test]
    fn earlier_entry_wins_ties() {
        let entries = vec![
            (HostPattern::parse("*.example.com"), "first"),
            (HostPattern::parse("*.EXAMPLE.com"), "second"),
        ];
        assert_eq!(best_match("a.example.com", &entries), Some(&"first"));
    }

    #[rstest]
    #[case("*.Example.com", "*.example.com")]
    #[case("*", "*")]
    #[case("Host.example.com.", "host.example.com")]
    fn parse_normalizes(#[case] pattern: &str, #[case] rendered: &str) {
        assert_eq!(HostPattern::parse(pattern).to_string(), rendered);
    }
}
