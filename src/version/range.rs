//! Version range expressions
//!
//! Supported forms:
//! - `1.2.3` - exact version
//! - `1.2.*`, `*` - wildcard prefix
//! - `[1.0, 2.0)`, `(1.0,)`, `(, 2.0]` - intervals with optional, independently
//!   inclusive or exclusive bounds
//! - `[1.0]` - bracketed single value, exactly `1.0`
//! - `a || b || c` - union of any of the above
//!
//! Parsing walks the token stream in a loop and the union is kept flat, so
//! expressions with hundreds of members never recurse.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::version::error::VersionParseError;
use crate::version::lexer::{Token, TokenKind, tokenize};
use crate::version::number::{Version, compare_numeric};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRange {
    Exact(Version),
    /// Leading numeric components that must match; empty matches everything
    Wildcard(Vec<String>),
    Interval {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    /// Members are never themselves unions
    Union(Vec<VersionRange>),
}

impl VersionRange {
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        if input.trim().is_empty() {
            return Err(VersionParseError::Empty);
        }

        let tokens = tokenize(input)?;
        let mut parser = RangeParser {
            tokens: &tokens,
            pos: 0,
            end_offset: input.len(),
        };

        let mut members = Vec::new();
        loop {
            members.push(parser.parse_member()?);
            match parser.peek() {
                None => break,
                Some(Token {
                    kind: TokenKind::Or,
                    ..
                }) => parser.pos += 1,
                Some(token) => {
                    return Err(VersionParseError::TrailingInput {
                        offset: token.offset,
                    });
                }
            }
        }

        Ok(if members.len() == 1 {
            members.remove(0)
        } else {
            VersionRange::Union(members)
        })
    }

    fn members(&self) -> &[VersionRange] {
        match self {
            VersionRange::Union(members) => members,
            single => std::slice::from_ref(single),
        }
    }

    /// Check whether a version lies within this range
    pub fn matches(&self, version: &Version) -> bool {
        self.members().iter().any(|member| member.matches_member(version))
    }

    fn matches_member(&self, version: &Version) -> bool {
        match self {
            VersionRange::Exact(expected) => version == expected,
            VersionRange::Wildcard(prefix) => prefix
                .iter()
                .enumerate()
                .all(|(i, c)| compare_numeric(version.component(i), c).is_eq()),
            VersionRange::Interval { min, max } => {
                let above_min = min.as_ref().is_none_or(|b| {
                    if b.inclusive {
                        version >= &b.version
                    } else {
                        version > &b.version
                    }
                });
                let below_max = max.as_ref().is_none_or(|b| {
                    if b.inclusive {
                        version <= &b.version
                    } else {
                        version < &b.version
                    }
                });
                above_min && below_max
            }
            VersionRange::Union(members) => members.iter().any(|m| m.matches_member(version)),
        }
    }

    /// Candidates matching this range, in their original order
    ///
    /// Unparseable candidates are skipped. A candidate string that appears more
    /// than once is returned only at its first position.
    pub fn select<'a, S: AsRef<str>>(&self, candidates: &'a [S]) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        candidates
            .iter()
            .map(AsRef::as_ref)
            .filter(|candidate| seen.insert(*candidate))
            .filter(|candidate| {
                Version::parse(candidate)
                    .map(|version| self.matches(&version))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Highest candidate matching this range
    pub fn max_satisfying<'a, S: AsRef<str>>(&self, candidates: &'a [S]) -> Option<&'a str> {
        self.satisfying(candidates).max_by(|(a, _), (b, _)| a.cmp(b)).map(|(_, s)| s)
    }

    /// Lowest candidate matching this range
    pub fn min_satisfying<'a, S: AsRef<str>>(&self, candidates: &'a [S]) -> Option<&'a str> {
        self.satisfying(candidates).min_by(|(a, _), (b, _)| a.cmp(b)).map(|(_, s)| s)
    }

    fn satisfying<'a, S: AsRef<str>>(
        &self,
        candidates: &'a [S],
    ) -> impl Iterator<Item = (Version, &'a str)> {
        candidates.iter().filter_map(move |candidate| {
            let candidate = candidate.as_ref();
            Version::parse(candidate)
                .ok()
                .filter(|version| self.matches(version))
                .map(|version| (version, candidate))
        })
    }
}

struct RangeParser<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    end_offset: usize,
}

impl<'a> RangeParser<'_, 'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.offset)
    }

    /// Parse one union member: a bare version, a wildcard or a bracketed interval
    fn parse_member(&mut self) -> Result<VersionRange, VersionParseError> {
        let Some(token) = self.next() else {
            return Err(VersionParseError::MissingRange {
                offset: self.end_offset,
            });
        };

        match token.kind {
            TokenKind::Version(text) if text.contains('*') => parse_wildcard(text),
            TokenKind::Version(text) => Version::parse(text).map(VersionRange::Exact),
            TokenKind::OpenInclusive | TokenKind::OpenExclusive => {
                self.parse_interval(token.kind == TokenKind::OpenInclusive, token.offset)
            }
            TokenKind::CloseInclusive | TokenKind::CloseExclusive => {
                Err(VersionParseError::UnbalancedBracket {
                    offset: token.offset,
                })
            }
            TokenKind::Comma | TokenKind::Or => Err(VersionParseError::MissingRange {
                offset: token.offset,
            }),
        }
    }

    fn parse_interval(
        &mut self,
        min_inclusive: bool,
        open_offset: usize,
    ) -> Result<VersionRange, VersionParseError> {
        let min = self.parse_bound()?;

        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Comma) => self.pos += 1,
            Some(TokenKind::CloseInclusive) if min_inclusive => {
                // `[1.0]` means exactly 1.0
                self.pos += 1;
                return min.map(VersionRange::Exact).ok_or(
                    VersionParseError::MissingRange {
                        offset: open_offset,
                    },
                );
            }
            None => {
                return Err(VersionParseError::UnbalancedBracket {
                    offset: open_offset,
                });
            }
            Some(_) => {
                return Err(VersionParseError::MissingSeparator {
                    offset: self.offset(),
                });
            }
        }

        let max = self.parse_bound()?;

        let max_inclusive = match self.next().map(|t| t.kind) {
            Some(TokenKind::CloseInclusive) => true,
            Some(TokenKind::CloseExclusive) => false,
            _ => {
                return Err(VersionParseError::UnbalancedBracket {
                    offset: open_offset,
                });
            }
        };

        Ok(VersionRange::Interval {
            min: min.map(|version| Bound {
                version,
                inclusive: min_inclusive,
            }),
            max: max.map(|version| Bound {
                version,
                inclusive: max_inclusive,
            }),
        })
    }

    /// Parse an optional bound version inside brackets
    fn parse_bound(&mut self) -> Result<Option<Version>, VersionParseError> {
        match self.peek().map(|t| t.kind) {
            Some(TokenKind::Version(text)) => {
                self.pos += 1;
                Version::parse(text).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// Parse `1.2.*` or `*`
fn parse_wildcard(text: &str) -> Result<VersionRange, VersionParseError> {
    let invalid = || VersionParseError::InvalidVersion(text.to_string());

    let prefix = if text == "*" {
        ""
    } else {
        text.strip_suffix(".*").ok_or_else(invalid)?
    };
    if prefix.is_empty() {
        return if text == "*" {
            Ok(VersionRange::Wildcard(Vec::new()))
        } else {
            Err(invalid())
        };
    }

    let version = Version::parse(prefix).map_err(|_| invalid())?;
    if version.is_pre_release() || version.build_metadata().is_some() {
        return Err(invalid());
    }
    Ok(VersionRange::Wildcard(version.components().to_vec()))
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRange::Exact(version) => write!(f, "{}", version),
            VersionRange::Wildcard(prefix) if prefix.is_empty() => f.write_str("*"),
            VersionRange::Wildcard(prefix) => write!(f, "{}.*", prefix.join(".")),
            VersionRange::Interval { min, max } => {
                let open = if min.as_ref().is_some_and(|b| b.inclusive) { '[' } else { '(' };
                let close = if max.as_ref().is_some_and(|b| b.inclusive) { ']' } else { ')' };
                let render = |b: &Option<Bound>| {
                    b.as_ref().map(|b| b.version.to_string()).unwrap_or_default()
                };
                write!(f, "{}{}, {}{}", open, render(min), render(max), close)
            }
            VersionRange::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    write!(f, "{}", member)?;
                }
                Ok(())
            }
        }
    }
}
