//! Parser for queries and rule sets.
//!
//! Built from chumsky combinators over a spanned token stream. Clause
//! shapes are resolved by token class: a pattern starting with an entity-id
//! literal is a lookup or entity scan, one starting with a variable is an
//! attribute scan or value filter, and a parenthesized group is a
//! predicate, rule invocation, or logical connective.

use chumsky::prelude::*;
use chumsky::stream::Stream;
use internment::Intern;
use std::fmt;

use crate::ast::*;
use crate::token::{lexer, LexError, SpannedToken, Token};
use crate::{Span, SrcId};

type ParserError = Simple<Token, Span>;

#[derive(Debug, Clone)]
pub enum ParseError {
    Lex(LexError),
    Parse(ParserError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "lex error: {}", e),
            ParseError::Parse(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

fn token(kind: Token) -> impl Parser<Token, Token, Error = ParserError> + Clone {
    just(kind)
}

fn variable_token() -> impl Parser<Token, Var, Error = ParserError> + Clone {
    select! { Token::Variable(name) => Var::new(name) }.labelled("variable")
}

/// Any keyword in attribute position, e.g. `:assign/key`.
fn attribute_token() -> impl Parser<Token, Symbol, Error = ParserError> + Clone {
    select! { Token::Keyword(name) => Intern::new(name) }.labelled("attribute")
}

/// A specific section keyword: `:find`, `:in`, `:where`.
fn section_token(name: &'static str) -> impl Parser<Token, (), Error = ParserError> + Clone {
    select! { Token::Keyword(k) if k == name => () }.labelled(name)
}

/// A specific connective identifier: `and`, `or`, `or-join`, `not`.
fn connective_token(name: &'static str) -> impl Parser<Token, (), Error = ParserError> + Clone {
    select! { Token::Ident(i) if i == name => () }.labelled(name)
}

const CONNECTIVES: &[&str] = &["and", "or", "or-join", "not"];

fn rule_name_token() -> impl Parser<Token, Symbol, Error = ParserError> + Clone {
    select! {
        Token::Ident(name) if !CONNECTIVES.contains(&name.as_str()) => Intern::new(name),
    }
    .labelled("rule name")
}

fn number_token() -> impl Parser<Token, i64, Error = ParserError> + Clone {
    select! { Token::Number(text) => text }
        .try_map(|text: String, span| {
            text.parse::<i64>()
                .map_err(|_| ParserError::custom(span, "invalid integer"))
        })
        .labelled("number")
}

fn value_token() -> impl Parser<Token, Value, Error = ParserError> + Clone {
    choice((
        number_token().map(Value::Number),
        select! { Token::String(text) => Value::String(text) },
        select! { Token::Bool(value) => Value::Bool(value) },
    ))
    .labelled("value")
}

fn fn_arg() -> impl Parser<Token, FnArg, Error = ParserError> + Clone {
    variable_token()
        .map(FnArg::Var)
        .or(value_token().map(FnArg::Const))
        .labelled("argument")
}

fn comparison_op() -> impl Parser<Token, ComparisonOp, Error = ParserError> + Clone {
    select! { Token::Operator(op) => op }
        .try_map(|op: String, span| {
            ComparisonOp::parse(&op)
                .ok_or_else(|| ParserError::custom(span, format!("unknown operator `{}`", op)))
        })
        .labelled("comparison operator")
}

/// `(< ?a ?b)` - the parenthesized interior of a predicate clause.
fn pred_body() -> impl Parser<Token, Clause, Error = ParserError> + Clone {
    comparison_op()
        .then(fn_arg().repeated().at_least(1))
        .delimited_by(token(Token::LParen), token(Token::RParen))
        .map(|(op, args)| Clause::Pred { op, args })
}

fn clause() -> impl Parser<Token, Clause, Error = ParserError> + Clone {
    recursive(|clause| {
        let lookup = number_token()
            .then(attribute_token())
            .then(variable_token())
            .map(|((entity, attribute), value)| Clause::Lookup {
                entity,
                attribute,
                value,
            });

        let entity = number_token()
            .then(variable_token())
            .then(variable_token())
            .map(|((entity, attribute), value)| Clause::Entity {
                entity,
                attribute,
                value,
            });

        let has_attr = variable_token()
            .then(attribute_token())
            .then(variable_token())
            .map(|((entity, attribute), value)| Clause::HasAttr {
                entity,
                attribute,
                value,
            });

        let filter = variable_token()
            .then(attribute_token())
            .then(value_token())
            .map(|((entity, attribute), value)| Clause::Filter {
                entity,
                attribute,
                value,
            });

        let pattern = choice((lookup, entity, has_attr, filter, pred_body()))
            .delimited_by(token(Token::LBracket), token(Token::RBracket))
            .labelled("pattern");

        let and = connective_token("and")
            .ignore_then(clause.clone().repeated().at_least(1))
            .map(Clause::And);

        let or_join = connective_token("or-join")
            .ignore_then(
                variable_token()
                    .repeated()
                    .at_least(1)
                    .delimited_by(token(Token::LBracket), token(Token::RBracket)),
            )
            .then(clause.clone().repeated().at_least(1))
            .map(|(projection, clauses)| Clause::OrJoin { projection, clauses });

        let or = connective_token("or")
            .ignore_then(clause.clone().repeated().at_least(1))
            .map(Clause::Or);

        let not = connective_token("not")
            .ignore_then(clause.clone().repeated().at_least(1))
            .map(Clause::Not);

        let rule_apply = rule_name_token()
            .then(fn_arg().repeated())
            .map(|(name, args)| Clause::RuleApply { name, args });

        let compound = choice((and, or_join, or, not, rule_apply))
            .delimited_by(token(Token::LParen), token(Token::RParen))
            .labelled("clause group");

        pattern.or(compound)
    })
}

fn find_element() -> impl Parser<Token, FindElement, Error = ParserError> + Clone {
    let aggregate = select! { Token::Ident(name) => name }
        .try_map(|name: String, span| match name.as_str() {
            "min" => Ok(AggregateFunc::Min),
            _ => Err(ParserError::custom(
                span,
                format!("unknown aggregate function `{}`", name),
            )),
        })
        .then(fn_arg().repeated().at_least(1))
        .delimited_by(token(Token::LParen), token(Token::RParen))
        .map(|(func, args)| FindElement::Aggregate { func, args });

    variable_token()
        .map(FindElement::Var)
        .or(aggregate)
        .labelled("find element")
}

fn query() -> impl Parser<Token, Query, Error = ParserError> {
    section_token("find")
        .ignore_then(find_element().repeated().at_least(1))
        .then(
            section_token("in")
                .ignore_then(variable_token().repeated().at_least(1))
                .or_not(),
        )
        .then(section_token("where").ignore_then(clause().repeated().at_least(1)))
        .delimited_by(token(Token::LBracket), token(Token::RBracket))
        .map(|((find, inputs), clauses)| Query {
            find,
            inputs: inputs.unwrap_or_default(),
            clauses,
        })
}

fn rule_def() -> impl Parser<Token, RuleDef, Error = ParserError> + Clone {
    rule_name_token()
        .then(variable_token().repeated())
        .delimited_by(token(Token::LParen), token(Token::RParen))
        .then(clause().repeated().at_least(1))
        .delimited_by(token(Token::LBracket), token(Token::RBracket))
        .map(|((name, head), body)| RuleDef { name, head, body })
}

fn rule_set() -> impl Parser<Token, Vec<RuleDef>, Error = ParserError> {
    rule_def()
        .repeated()
        .at_least(1)
        .delimited_by(token(Token::LBracket), token(Token::RBracket))
}

fn lex_with_src(input: &str, src: SrcId) -> Result<Vec<SpannedToken>, Vec<ParseError>> {
    let len = input.chars().count();
    let eoi = Span::new(src, len..len);
    let stream = Stream::from_iter(
        eoi,
        input
            .chars()
            .enumerate()
            .map(|(idx, ch)| (ch, Span::new(src, idx..idx + 1))),
    );
    lexer()
        .parse(stream)
        .map_err(|errors| errors.into_iter().map(ParseError::Lex).collect())
}

fn parse_with<T>(
    parser: impl Parser<Token, T, Error = ParserError>,
    input: &str,
    src: SrcId,
) -> Result<T, Vec<ParseError>> {
    let tokens = lex_with_src(input, src)?;
    let input_len = input.chars().count();
    let eoi = Span::new(src, input_len..input_len);
    let stream = Stream::from_iter(eoi, tokens.into_iter());
    parser
        .then_ignore(end())
        .parse(stream)
        .map_err(|errors| errors.into_iter().map(ParseError::Parse).collect())
}

/// Parse a single query form.
pub fn parse_query(input: &str, src: SrcId) -> Result<Query, Vec<ParseError>> {
    parse_with(query(), input, src)
}

/// Parse a rule set: a vector of rule definitions.
pub fn parse_rules(input: &str, src: SrcId) -> Result<Vec<RuleDef>, Vec<ParseError>> {
    parse_with(rule_set(), input, src)
}
