//! Pratt parser for formulas.
//!
//! Precedence (lowest to highest): `+ -`, `* /`, unary `-`, `^`. All binary
//! operators are left associative except `^`.

use std::{iter::Peekable, ops::Range, vec::IntoIter};

use thiserror::Error;

use crate::Value;

use super::{
    BinaryOp, Formula, Function,
    lexer::{Token, tokenize},
};

/// Errors that can occur when parsing a formula.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unrecognized character at offset {offset}")]
    InvalidCharacter { offset: usize },

    #[error("expected {expected} at offset {offset}, found {found}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("expected {expected}, found end of expression")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
}

const UNARY_PRECEDENCE: u8 = 55;

struct TokenStream {
    tokens: Peekable<IntoIter<(Token, Range<usize>)>>,
}

impl TokenStream {
    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<(Token, Range<usize>)> {
        self.tokens.next()
    }

    fn expect(&mut self, wanted: &Token, expected: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some((token, _)) if token == *wanted => Ok(()),
            Some((token, span)) => Err(unexpected(&token, &span, expected)),
            None => Err(ParseError::UnexpectedEnd { expected }),
        }
    }
}

fn unexpected(token: &Token, span: &Range<usize>, expected: &'static str) -> ParseError {
    ParseError::UnexpectedToken {
        found: token.to_string(),
        expected,
        offset: span.start,
    }
}

/// Parses a complete formula.
pub(super) fn parse(source: &str) -> Result<Formula, ParseError> {
    let tokens = tokenize(source).map_err(|offset| ParseError::InvalidCharacter { offset })?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut stream = TokenStream {
        tokens: tokens.into_iter().peekable(),
    };
    let formula = parse_pratt(&mut stream, 0)?;

    match stream.advance() {
        None => Ok(formula),
        Some((token, span)) => Err(unexpected(&token, &span, "operator or end of expression")),
    }
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Plus => Some(BinaryOp::Add),
        Token::Minus => Some(BinaryOp::Sub),
        Token::Star => Some(BinaryOp::Mul),
        Token::Slash => Some(BinaryOp::Div),
        Token::Caret => Some(BinaryOp::Pow),
        _ => None,
    }
}

fn parse_pratt(stream: &mut TokenStream, min_prec: u8) -> Result<Formula, ParseError> {
    let mut lhs = parse_prefix(stream)?;

    while let Some(op) = stream.peek().and_then(binary_op) {
        let prec = op.precedence();
        if prec < min_prec {
            break;
        }
        stream.advance();

        let next_prec = if op == BinaryOp::Pow { prec } else { prec + 1 };
        let rhs = parse_pratt(stream, next_prec)?;
        lhs = Formula::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }

    Ok(lhs)
}

fn parse_prefix(stream: &mut TokenStream) -> Result<Formula, ParseError> {
    if stream.peek() == Some(&Token::Minus) {
        stream.advance();
        // Binds looser than `^`, so `-a ^ 2` is `-(a ^ 2)`.
        let operand = parse_pratt(stream, UNARY_PRECEDENCE + 1)?;
        return Ok(Formula::Negate(Box::new(operand)));
    }
    parse_atom(stream)
}

fn parse_atom(stream: &mut TokenStream) -> Result<Formula, ParseError> {
    const EXPECTED: &str = "number, name, text or '('";

    let (token, span) = stream
        .advance()
        .ok_or(ParseError::UnexpectedEnd { expected: EXPECTED })?;

    match token {
        Token::Number(n) => Ok(Formula::Constant(Value::Number(n))),
        Token::Text(text) => Ok(Formula::Constant(Value::Text(text))),
        Token::LParen => {
            let inner = parse_pratt(stream, 0)?;
            stream.expect(&Token::RParen, "')'")?;
            Ok(inner)
        }
        Token::Ident(name) if stream.peek() == Some(&Token::LParen) => parse_call(stream, name),
        Token::Ident(name) if name.eq_ignore_ascii_case("true") => {
            Ok(Formula::Constant(Value::Boolean(true)))
        }
        Token::Ident(name) if name.eq_ignore_ascii_case("false") => {
            Ok(Formula::Constant(Value::Boolean(false)))
        }
        Token::Ident(name) => Ok(Formula::Parameter(name)),
        other => Err(unexpected(&other, &span, EXPECTED)),
    }
}

fn parse_call(stream: &mut TokenStream, name: String) -> Result<Formula, ParseError> {
    let function = Function::from_name(&name).ok_or(ParseError::UnknownFunction { name })?;
    stream.expect(&Token::LParen, "'('")?;

    let mut args = Vec::new();
    if stream.peek() == Some(&Token::RParen) {
        stream.advance();
        return Ok(Formula::Call { function, args });
    }

    loop {
        args.push(parse_pratt(stream, 0)?);
        match stream.advance() {
            Some((Token::Comma, _)) => {}
            Some((Token::RParen, _)) => break,
            Some((token, span)) => return Err(unexpected(&token, &span, "',' or ')'")),
            None => return Err(ParseError::UnexpectedEnd { expected: "',' or ')'" }),
        }
    }

    Ok(Formula::Call { function, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Box<Formula> {
        Box::new(Formula::Parameter(name.to_string()))
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(
            parse("a - b - c").unwrap(),
            Formula::Binary {
                op: BinaryOp::Sub,
                lhs: Box::new(Formula::Binary {
                    op: BinaryOp::Sub,
                    lhs: param("a"),
                    rhs: param("b"),
                }),
                rhs: param("c"),
            }
        );
        assert_eq!(
            parse("a + b * c").unwrap(),
            Formula::Binary {
                op: BinaryOp::Add,
                lhs: param("a"),
                rhs: Box::new(Formula::Binary {
                    op: BinaryOp::Mul,
                    lhs: param("b"),
                    rhs: param("c"),
                }),
            }
        );
    }

    #[test]
    fn parses_calls() {
        assert_eq!(
            parse("max(a, 1)").unwrap(),
            Formula::Call {
                function: Function::Max,
                args: vec![Formula::Parameter("a".to_string()), Formula::Constant(Value::Number(1.0))],
            }
        );
    }

    #[test]
    fn reports_errors() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("a +"), Err(ParseError::UnexpectedEnd {
            expected: "number, name, text or '('"
        }));
        assert!(matches!(parse("(a + b"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("a b"), Err(ParseError::UnexpectedToken { offset: 2, .. })));
        assert_eq!(
            parse("foo(1)"),
            Err(ParseError::UnknownFunction {
                name: "foo".to_string()
            })
        );
        assert_eq!(parse("a # b"), Err(ParseError::InvalidCharacter { offset: 2 }));
    }
}
