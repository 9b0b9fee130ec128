//! Tokenizer for version range expressions

use crate::version::error::VersionParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// `[` inclusive lower bound
    OpenInclusive,
    /// `(` exclusive lower bound
    OpenExclusive,
    /// `]` inclusive upper bound
    CloseInclusive,
    /// `)` exclusive upper bound
    CloseExclusive,
    Comma,
    /// `||` union operator
    Or,
    /// Version text, possibly containing a `*` wildcard
    Version(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub offset: usize,
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '*')
}

/// Split an expression into tokens in a single forward pass
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, VersionParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '[' => TokenKind::OpenInclusive,
            '(' => TokenKind::OpenExclusive,
            ']' => TokenKind::CloseInclusive,
            ')' => TokenKind::CloseExclusive,
            ',' => TokenKind::Comma,
            '|' => match chars.next() {
                Some((_, '|')) => TokenKind::Or,
                _ => return Err(VersionParseError::UnexpectedChar { found: '|', offset }),
            },
            c if is_version_char(c) => {
                let mut end = offset + c.len_utf8();
                while let Some(&(next_offset, next)) = chars.peek() {
                    if !is_version_char(next) {
                        break;
                    }
                    end = next_offset + next.len_utf8();
                    chars.next();
                }
                TokenKind::Version(&input[offset..end])
            }
            found => return Err(VersionParseError::UnexpectedChar { found, offset }),
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}
