use chumsky::prelude::*;
use std::fmt;

use crate::Span;

pub type SpannedToken = (Token, Span);
pub type LexError = Simple<char, Span>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Bare identifier: rule names, `and`/`or`/`or-join`/`not`, aggregate names.
    Ident(String),
    /// Logic variable `?name` (payload without the `?`).
    Variable(String),
    /// Keyword `:name` or `:namespace/name` (payload without the `:`).
    Keyword(String),
    /// Integer literal, kept as text until parsing.
    Number(String),
    String(String),
    Bool(bool),
    /// Comparison operator: `<` `<=` `>` `>=` `=` `!=`.
    Operator(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(text) => write!(f, "{}", text),
            Token::Variable(name) => write!(f, "?{}", name),
            Token::Keyword(name) => write!(f, ":{}", name),
            Token::Number(text) => write!(f, "{}", text),
            Token::String(text) => write!(f, "\"{}\"", text),
            Token::Bool(value) => write!(f, "{}", value),
            Token::Operator(op) => write!(f, "{}", op),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// Identifier body: letters, digits, `_` and `-`, starting with a letter
/// or `_`. Covers rule names and attribute name segments alike.
fn ident_text() -> impl Parser<char, String, Error = LexError> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .repeated(),
        )
        .map(|(first, rest)| std::iter::once(first).chain(rest).collect())
        .labelled("identifier")
}

fn identifier() -> impl Parser<char, Token, Error = LexError> + Clone {
    ident_text().map(|text| match text.as_str() {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => Token::Ident(text),
    })
}

fn variable() -> impl Parser<char, Token, Error = LexError> + Clone {
    just('?')
        .ignore_then(ident_text())
        .map(Token::Variable)
        .labelled("variable")
}

/// Keyword, optionally namespaced: `:find`, `:assign/key`.
fn keyword() -> impl Parser<char, Token, Error = LexError> + Clone {
    just(':')
        .ignore_then(
            ident_text().then(just('/').ignore_then(ident_text()).or_not()),
        )
        .map(|(namespace, name)| match name {
            Some(name) => Token::Keyword(format!("{}/{}", namespace, name)),
            None => Token::Keyword(namespace),
        })
        .labelled("keyword")
}

fn number_literal() -> impl Parser<char, Token, Error = LexError> + Clone {
    just('-')
        .or_not()
        .then(text::int(10))
        .map(|(sign, digits): (Option<char>, String)| {
            let text = match sign {
                Some(_) => format!("-{}", digits),
                None => digits,
            };
            Token::Number(text)
        })
        .labelled("number")
}

fn string_literal() -> impl Parser<char, Token, Error = LexError> + Clone {
    let escape_sequence = just('\\').ignore_then(choice((
        just('"').to('"'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('\\').to('\\'),
    )));

    let string_char = choice((
        escape_sequence,
        filter(|c| *c != '"' && *c != '\\' && *c != '\n'),
    ));

    just('"')
        .ignore_then(string_char.repeated())
        .then_ignore(just('"'))
        .collect::<String>()
        .map(Token::String)
        .labelled("string")
}

fn line_comment() -> impl Parser<char, (), Error = LexError> + Clone {
    just(';')
        .then(filter(|c| *c != '\n').repeated())
        .ignored()
        .labelled("comment")
}

fn spacing() -> impl Parser<char, (), Error = LexError> + Clone {
    line_comment()
        .or(text::whitespace().at_least(1).ignored())
        .repeated()
        .ignored()
}

pub fn lexer() -> impl Parser<char, Vec<SpannedToken>, Error = LexError> + Clone {
    let punct = choice((
        just("<=").to(Token::Operator("<=".to_string())),
        just(">=").to(Token::Operator(">=".to_string())),
        just("!=").to(Token::Operator("!=".to_string())),
        just('<').to(Token::Operator("<".to_string())),
        just('>').to(Token::Operator(">".to_string())),
        just('=').to(Token::Operator("=".to_string())),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
    ));

    let token = choice((
        string_literal(),
        number_literal(),
        variable(),
        keyword(),
        identifier(),
        punct,
    ))
    .map_with_span(|token, span| (token, span))
    .padded_by(spacing());

    token.repeated().then_ignore(end())
}
