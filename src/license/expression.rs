//! License expression evaluation
//!
//! Extracts identifiers from expressions such as
//! `(MIT OR Apache-2.0) AND GPL-2.0-only WITH Classpath-exception-2.0`.
//! Evaluation never fails: anything that cannot be read as an identifier is
//! dropped, so unbalanced parentheses or dangling operators still yield the
//! identifiers that are present.

use indexmap::IndexSet;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

const OPERATORS: [&str; 3] = ["AND", "OR", "WITH"];

/// Base URL of the license expression service used by the public registry
pub const LICENSE_SERVICE_URL: &str = "https://licenses.nuget.org";

/// Placeholder URL published by packages that moved to license expressions
pub const DEPRECATED_LICENSE_URL: &str = "https://aka.ms/deprecateLicenseUrl";

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+')
}

fn is_operator(token: &str) -> bool {
    OPERATORS.iter().any(|op| token.eq_ignore_ascii_case(op))
}

/// Extract the unique license and exception identifiers from an expression
///
/// Identifiers keep their casing and first-seen order. `None`, empty and
/// whitespace-only input produce an empty set.
pub fn extract_identifiers(expression: Option<&str>) -> IndexSet<String> {
    let Some(expression) = expression else {
        return IndexSet::new();
    };

    expression
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|token| !token.is_empty())
        .filter(|token| !is_operator(token))
        .filter(|token| token.chars().all(is_identifier_char))
        .map(str::to_string)
        .collect()
}

/// Characters escaped in the path segment of a license service URL
const LICENSE_PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'(')
    .add(b')')
    .add(b'+')
    .add(b'/')
    .add(b'?');

/// License service URL for an expression
pub fn license_url(expression: &str) -> String {
    let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "{}/{}",
        LICENSE_SERVICE_URL,
        utf8_percent_encode(&normalized, LICENSE_PATH_SET)
    )
}

/// Recover the expression encoded in a license service URL
///
/// Returns `None` for URLs pointing anywhere else, and for paths that do not
/// decode to at least one identifier.
pub fn expression_from_license_url(url: &str) -> Option<String> {
    let rest = url
        .trim()
        .strip_prefix(LICENSE_SERVICE_URL)?
        .strip_prefix('/')?;
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(path.trim_end_matches('/'))
        .decode_utf8()
        .ok()?;
    let decoded = decoded.trim();
    if extract_identifiers(Some(decoded)).is_empty() {
        return None;
    }
    Some(decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn extract(expression: &str) -> Vec<String> {
        extract_identifiers(Some(expression)).into_iter().collect()
    }

    #[test]
    fn duplicates_are_suppressed_in_first_seen_order() {
        assert_eq!(
            extract("MIT AND MIT OR MIT WITH MIT-exception"),
            vec!["MIT", "MIT-exception"]
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn blank_input_yields_empty_set(#[case] expression: Option<&str>) {
        assert!(extract_identifiers(expression).is_empty());
    }

    #[rstest]
    #[case("(MIT OR Apache-2.0) AND BSD-3-Clause", &["MIT", "Apache-2.0", "BSD-3-Clause"])]
    #[case("GPL-2.0-or-later WITH Classpath-exception-2.0", &["GPL-2.0-or-later", "Classpath-exception-2.0"])]
    #[case("mit and Apache-2.0 or with", &["mit", "Apache-2.0"])]
    #[case("((MIT", &["MIT"])]
    #[case("MIT))) AND AND OR (", &["MIT"])]
    #[case("LGPL-2.1+ OR LicenseRef-my_license.1", &["LGPL-2.1+", "LicenseRef-my_license.1"])]
    #[case("MIT OR mit", &["MIT", "mit"])]
    #[case("MIT/X11 OR Zlib", &["Zlib"])]
    #[case("AND OR WITH", &[])]
    fn extracts_identifiers(#[case] expression: &str, #[case] expected: &[&str]) {
        assert_eq!(extract(expression), expected);
    }

    #[test]
    fn handles_long_expressions() {
        let expression = (0..10_000)
            .map(|i| format!("(L-{}", i % 100))
            .collect::<Vec<_>>()
            .join(" OR ");
        assert_eq!(extract_identifiers(Some(&expression)).len(), 100);
    }

    #[rstest]
    #[case("MIT", "https://licenses.nuget.org/MIT")]
    #[case("MIT OR Apache-2.0", "https://licenses.nuget.org/MIT%20OR%20Apache-2.0")]
    #[case("(MIT)", "https://licenses.nuget.org/%28MIT%29")]
    #[case("  LGPL-2.1+   OR\tMIT ", "https://licenses.nuget.org/LGPL-2.1%2B%20OR%20MIT")]
    fn builds_license_url(#[case] expression: &str, #[case] expected: &str) {
        assert_eq!(license_url(expression), expected);
    }

    #[rstest]
    #[case("https://licenses.nuget.org/MIT", Some("MIT"))]
    #[case("https://licenses.nuget.org/MIT%20OR%20Apache-2.0", Some("MIT OR Apache-2.0"))]
    #[case("https://licenses.nuget.org/%28LGPL-2.0-only%20WITH%20FLTK-exception%20OR%20Apache-2.0%2B%29", Some("(LGPL-2.0-only WITH FLTK-exception OR Apache-2.0+)"))]
    #[case("https://licenses.nuget.org/", None)]
    #[case("https://licenses.nuget.org/%zz", None)]
    #[case("https://licenses.nuget.org/%20%28%29", None)]
    #[case("https://licenses.nuget.org/Apache-2.0/?utm=1", Some("Apache-2.0"))]
    #[case("https://example.com/MIT", None)]
    fn recovers_expression_from_url(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            expression_from_license_url(url),
            expected.map(str::to_string)
        );
    }
}
