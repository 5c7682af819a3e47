//! Tokenizer for the Cypher subset.
//!
//! Keywords are not distinguished here; they surface as [`Token::Ident`]
//! and the parser matches them case-insensitively in context, so `match`
//! remains usable as a property name after a dot.

use crate::error::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier or keyword.
    Ident(String),
    /// String literal, decoded (quotes and escapes removed).
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Float(f64),
    /// Parameter reference `$name`.
    Param(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Star,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Dash,
}

impl Token {
    /// Returns whether this is the identifier `word`, case-insensitively.
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(word))
    }
}

/// A token plus the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Tokenizes `input`, skipping whitespace and `//` line comments.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'(' => push(&mut tokens, Token::LParen, start, &mut i),
            b')' => push(&mut tokens, Token::RParen, start, &mut i),
            b'[' => push(&mut tokens, Token::LBracket, start, &mut i),
            b']' => push(&mut tokens, Token::RBracket, start, &mut i),
            b'{' => push(&mut tokens, Token::LBrace, start, &mut i),
            b'}' => push(&mut tokens, Token::RBrace, start, &mut i),
            b',' => push(&mut tokens, Token::Comma, start, &mut i),
            b':' => push(&mut tokens, Token::Colon, start, &mut i),
            b'.' => push(&mut tokens, Token::Dot, start, &mut i),
            b'*' => push(&mut tokens, Token::Star, start, &mut i),
            b'-' => push(&mut tokens, Token::Dash, start, &mut i),
            b'=' => push(&mut tokens, Token::Eq, start, &mut i),
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Ne, offset: start });
                    i += 2;
                } else {
                    return Err(ParseError::new(start, "unexpected '!'"));
                }
            }
            b'<' => match bytes.get(i + 1) {
                Some(b'=') => {
                    tokens.push(Spanned { token: Token::Le, offset: start });
                    i += 2;
                }
                Some(b'>') => {
                    tokens.push(Spanned { token: Token::Ne, offset: start });
                    i += 2;
                }
                _ => push(&mut tokens, Token::Lt, start, &mut i),
            },
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::Ge, offset: start });
                    i += 2;
                } else {
                    push(&mut tokens, Token::Gt, start, &mut i);
                }
            }
            b'\'' | b'"' => {
                let (s, next) = read_string(input, i)?;
                tokens.push(Spanned { token: Token::Str(s), offset: start });
                i = next;
            }
            b'$' => {
                i += 1;
                let (name, next) = read_ident(bytes, i);
                if name.is_empty() {
                    return Err(ParseError::new(start, "expected parameter name after '$'"));
                }
                tokens.push(Spanned { token: Token::Param(name), offset: start });
                i = next;
            }
            b'0'..=b'9' => {
                let (token, next) = read_number(bytes, i, start)?;
                tokens.push(Spanned { token, offset: start });
                i = next;
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let (name, next) = read_ident(bytes, i);
                tokens.push(Spanned { token: Token::Ident(name), offset: start });
                i = next;
            }
            other => {
                return Err(ParseError::new(
                    start,
                    format!("unexpected character '{}'", other as char),
                ));
            }
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Spanned>, token: Token, offset: usize, i: &mut usize) {
    tokens.push(Spanned { token, offset });
    *i += 1;
}

fn read_ident(bytes: &[u8], mut i: usize) -> (String, usize) {
    let start = i;
    while i < bytes.len() && (bytes[i] == b'_' || bytes[i].is_ascii_alphanumeric()) {
        i += 1;
    }
    (
        String::from_utf8_lossy(&bytes[start..i]).into_owned(),
        i,
    )
}

fn read_number(bytes: &[u8], mut i: usize, start: usize) -> Result<(Token, usize), ParseError> {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    // A dot only continues the number when a digit follows, so range
    // syntax like `1..3` stays three tokens.
    let is_float = bytes.get(i) == Some(&b'.')
        && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
    if is_float {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let text = std::str::from_utf8(&bytes[start..i])
            .map_err(|_| ParseError::new(start, "invalid number"))?;
        let value: f64 = text
            .parse()
            .map_err(|_| ParseError::new(start, format!("invalid float literal '{text}'")))?;
        Ok((Token::Float(value), i))
    } else {
        let text = std::str::from_utf8(&bytes[start..i])
            .map_err(|_| ParseError::new(start, "invalid number"))?;
        let value: i64 = text
            .parse()
            .map_err(|_| ParseError::new(start, format!("invalid integer literal '{text}'")))?;
        Ok((Token::Int(value), i))
    }
}

fn read_string(input: &str, start: usize) -> Result<(String, usize), ParseError> {
    let bytes = input.as_bytes();
    let quote = bytes[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let escaped = bytes
                    .get(i + 1)
                    .ok_or_else(|| ParseError::new(i, "unterminated escape"))?;
                match escaped {
                    b'\'' => out.push('\''),
                    b'"' => out.push('"'),
                    b'\\' => out.push('\\'),
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    other => {
                        return Err(ParseError::new(
                            i,
                            format!("unknown escape '\\{}'", *other as char),
                        ));
                    }
                }
                i += 2;
            }
            b if b == quote => return Ok((out, i + 1)),
            _ => {
                // Consume the full UTF-8 scalar, not just one byte.
                let ch = input[i..].chars().next().unwrap_or('\u{FFFD}');
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    Err(ParseError::new(start, "unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_match_pattern_tokens() {
        let toks = kinds("MATCH (g:Geography)");
        assert_eq!(
            toks,
            vec![
                Token::Ident("MATCH".into()),
                Token::LParen,
                Token::Ident("g".into()),
                Token::Colon,
                Token::Ident("Geography".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_relationship_arrow_tokens() {
        let toks = kinds("-[t:TRADES_WITH]->");
        assert_eq!(
            toks,
            vec![
                Token::Dash,
                Token::LBracket,
                Token::Ident("t".into()),
                Token::Colon,
                Token::Ident("TRADES_WITH".into()),
                Token::RBracket,
                Token::Dash,
                Token::Gt,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(kinds("<= >= <> != < >"), vec![
            Token::Le,
            Token::Ge,
            Token::Ne,
            Token::Ne,
            Token::Lt,
            Token::Gt,
        ]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r"'Cote d\'Ivoire'"), vec![Token::Str("Cote d'Ivoire".into())]);
        assert_eq!(kinds(r#""say \"hi\"""#), vec![Token::Str("say \"hi\"".into())]);
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        assert!(tokenize("'oops").is_err());
    }

    #[test]
    fn test_numbers_and_ranges() {
        assert_eq!(kinds("1.5"), vec![Token::Float(1.5)]);
        assert_eq!(
            kinds("1..3"),
            vec![Token::Int(1), Token::Dot, Token::Dot, Token::Int(3)]
        );
    }

    #[test]
    fn test_params_and_offsets() {
        let toks = tokenize("WHERE g.name = $name").unwrap();
        assert_eq!(toks.last().unwrap().token, Token::Param("name".into()));
        assert_eq!(toks[0].offset, 0);
        assert_eq!(toks[1].offset, 6);
    }

    #[test]
    fn test_line_comment_skipped() {
        assert_eq!(kinds("RETURN g // trailing"), vec![
            Token::Ident("RETURN".into()),
            Token::Ident("g".into()),
        ]);
    }
}
