use std::{fmt, ops::Range};

use logos::Logos;

/// Formula token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub(super) enum Token {
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"'[^']*'", |lex| unquote(lex.slice()))]
    #[regex(r#""[^"]*""#, |lex| unquote(lex.slice()))]
    Text(String),
}

fn unquote(slice: &str) -> String {
    slice[1..slice.len() - 1].to_string()
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::Caret => f.write_str("'^'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Text(text) => write!(f, "text '{text}'"),
        }
    }
}

/// Splits `source` into tokens with their byte spans.
///
/// Returns the byte offset of the first character that is not part of any
/// token on failure.
pub(super) fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, usize> {
    Token::lexer(source)
        .spanned()
        .map(|(token, span)| token.map(|token| (token, span.clone())).map_err(|()| span.start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_formula() {
        let tokens: Vec<Token> = tokenize("min(a.b, 2.5e1) - 'x'")
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect();

        assert_eq!(
            tokens,
            vec![
                Token::Ident("min".to_string()),
                Token::LParen,
                Token::Ident("a.b".to_string()),
                Token::Comma,
                Token::Number(25.0),
                Token::RParen,
                Token::Minus,
                Token::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn reports_offending_offset() {
        assert_eq!(tokenize("a + $b"), Err(4));
    }
}
