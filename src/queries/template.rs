//! Traversal templates
//!
//! A template is a Gremlin-style expression such as
//! `graph.V().has('firstName', ?).outE('Likes').as('x').inV().has('firstName', ?).select('x')`.
//! It is parsed once into a `Traversal` whose `?` placeholders become slots,
//! numbered in the order they appear. Arguments are substituted as typed
//! values, never spliced into the text.

use crate::errors::{OgmResult, QueryError};
use crate::session::GraphSession;
use crate::store::ElementRef;
use crate::traversal::{self, Predicate, Step, Traversal, Value};
use crate::value_objects::PropertyValue;
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Dot,
    LParen,
    RParen,
    Comma,
    Question,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Int(i) => write!(f, "{i}"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Null => write!(f, "null"),
            Token::Dot => write!(f, "'.'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Question => write!(f, "'?'"),
            Token::End => write!(f, "end of template"),
        }
    }
}

static END: Token = Token::End;

fn parse_error(position: usize, message: impl Into<String>) -> QueryError {
    QueryError::TemplateParseError {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push((start, Token::Dot));
            }
            '(' => {
                chars.next();
                tokens.push((start, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((start, Token::RParen));
            }
            ',' => {
                chars.next();
                tokens.push((start, Token::Comma));
            }
            '?' => {
                chars.next();
                tokens.push((start, Token::Question));
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        quote if quote == c => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(parse_error(start, "unterminated string literal"));
                }
                tokens.push((start, Token::Str(value)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_digit() || next == '.' || (next == '-' && text.is_empty()) {
                        text.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Gremlin numeric suffixes
                if let Some(&(_, 'L' | 'l' | 'd' | 'D' | 'f' | 'F')) = chars.peek() {
                    chars.next();
                }
                let token = if text.contains('.') {
                    text.parse().map(Token::Float)
                } else {
                    // integers too large for i64 fall back to floats
                    text.parse().map(Token::Int).or_else(|_| text.parse().map(Token::Float))
                };
                let token = token.map_err(|_| parse_error(start, format!("invalid number '{text}'")))?;
                tokens.push((start, token));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(ident),
                };
                tokens.push((start, token));
            }
            other => return Err(parse_error(start, format!("unexpected character '{other}'"))),
        }
    }
    tokens.push((source.len(), Token::End));
    Ok(tokens)
}

/// A step argument before it is given meaning by its step
#[derive(Debug)]
enum Arg {
    Value(Value),
    Call { name: String, args: Vec<(usize, Arg)> },
    Anonymous(Traversal),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    placeholders: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.cursor).map_or(&END, |(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.cursor).map_or(0, |(p, _)| *p)
    }

    fn advance(&mut self) -> (usize, Token) {
        let token = self
            .tokens
            .get(self.cursor)
            .cloned()
            .unwrap_or((self.position(), Token::End));
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        let (position, token) = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(parse_error(position, format!("expected {expected}, found {token}")))
        }
    }

    fn ident(&mut self) -> Result<(usize, String), QueryError> {
        match self.advance() {
            (position, Token::Ident(name)) => Ok((position, name)),
            (position, token) => Err(parse_error(position, format!("expected a step name, found {token}"))),
        }
    }

    fn template(&mut self) -> Result<Traversal, QueryError> {
        let (position, root) = self.ident()?;
        if root != "graph" && root != "g" {
            return Err(parse_error(position, format!("template must start with 'graph' or 'g', found '{root}'")));
        }
        self.expect(Token::Dot)?;

        let (position, source) = self.ident()?;
        self.expect(Token::LParen)?;
        let args = self.args()?;
        let ids = args
            .into_iter()
            .map(|(p, arg)| value(p, arg))
            .collect::<Result<Vec<_>, _>>()?;
        let mut steps = vec![match source.as_str() {
            "V" => Step::V(ids),
            "E" => Step::E(ids),
            _ => return Err(parse_error(position, format!("expected V() or E(), found '{source}'"))),
        }];

        self.chain(&mut steps)?;
        let (position, token) = self.advance();
        if token != Token::End {
            return Err(parse_error(position, format!("unexpected {token} after traversal")));
        }
        Ok(Traversal::from_steps(steps))
    }

    fn chain(&mut self, steps: &mut Vec<Step>) -> Result<(), QueryError> {
        while *self.peek() == Token::Dot {
            self.advance();
            let (position, name) = self.ident()?;
            self.expect(Token::LParen)?;
            let args = self.args()?;
            steps.extend(step(position, &name, args)?);
        }
        Ok(())
    }

    /// Arguments up to and including the closing parenthesis
    fn args(&mut self) -> Result<Vec<(usize, Arg)>, QueryError> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            match self.advance() {
                (_, Token::Comma) => continue,
                (_, Token::RParen) => return Ok(args),
                (position, token) => return Err(parse_error(position, format!("expected ',' or ')', found {token}"))),
            }
        }
    }

    fn arg(&mut self) -> Result<(usize, Arg), QueryError> {
        let (position, token) = self.advance();
        let arg = match token {
            Token::Question => {
                let slot = self.placeholders;
                self.placeholders += 1;
                Arg::Value(Value::Slot(slot))
            }
            Token::Str(s) => Arg::Value(Value::Literal(PropertyValue::String(s))),
            Token::Int(i) => Arg::Value(Value::Literal(PropertyValue::Integer(i))),
            Token::Float(x) => Arg::Value(Value::Literal(PropertyValue::Float(x))),
            Token::Bool(b) => Arg::Value(Value::Literal(PropertyValue::Boolean(b))),
            Token::Null => Arg::Value(Value::Literal(PropertyValue::Null)),
            Token::Ident(name) if name == "__" => {
                let mut steps = Vec::new();
                self.chain(&mut steps)?;
                if steps.is_empty() {
                    return Err(parse_error(position, "anonymous traversal needs at least one step"));
                }
                Arg::Anonymous(Traversal::from_steps(steps))
            }
            Token::Ident(name) => {
                self.expect(Token::LParen)?;
                Arg::Call {
                    name,
                    args: self.args()?,
                }
            }
            other => return Err(parse_error(position, format!("expected an argument, found {other}"))),
        };
        Ok((position, arg))
    }
}

fn value(position: usize, arg: Arg) -> Result<Value, QueryError> {
    match arg {
        Arg::Value(value) => Ok(value),
        _ => Err(parse_error(position, "expected a literal or '?'")),
    }
}

/// Keys, labels and aliases must be written out in the template
fn name(position: usize, arg: Arg) -> Result<String, QueryError> {
    match arg {
        Arg::Value(Value::Literal(PropertyValue::String(s))) => Ok(s),
        Arg::Value(Value::Slot(_)) => Err(parse_error(position, "placeholders are only allowed in value positions")),
        _ => Err(parse_error(position, "expected a quoted name")),
    }
}

fn names(args: Vec<(usize, Arg)>) -> Result<Vec<String>, QueryError> {
    args.into_iter().map(|(p, arg)| name(p, arg)).collect()
}

fn anonymous(position: usize, arg: Arg) -> Result<Traversal, QueryError> {
    match arg {
        Arg::Anonymous(traversal) => Ok(traversal),
        _ => Err(parse_error(position, "expected an anonymous traversal starting with '__'")),
    }
}

fn predicate(position: usize, arg: Arg) -> Result<Predicate, QueryError> {
    let (name, args) = match arg {
        Arg::Value(value) => return Ok(Predicate::Eq(value)),
        Arg::Call { name, args } => (name, args),
        Arg::Anonymous(_) => return Err(parse_error(position, "expected a value or predicate")),
    };
    let values = args
        .into_iter()
        .map(|(p, arg)| value(p, arg))
        .collect::<Result<Vec<_>, _>>()?;
    let count_error = |found: usize, expected: usize| {
        parse_error(position, format!("{name}() takes {expected} argument(s), got {found}"))
    };

    match name.as_str() {
        "within" => Ok(Predicate::Within(values)),
        "between" => {
            let [low, high]: [Value; 2] = values.try_into().map_err(|v: Vec<Value>| count_error(v.len(), 2))?;
            Ok(Predicate::Between(low, high))
        }
        "eq" | "neq" | "gt" | "gte" | "lt" | "lte" => {
            let [operand]: [Value; 1] = values.try_into().map_err(|v: Vec<Value>| count_error(v.len(), 1))?;
            Ok(match name.as_str() {
                "eq" => Predicate::Eq(operand),
                "neq" => Predicate::Neq(operand),
                "gt" => Predicate::Gt(operand),
                "gte" => Predicate::Gte(operand),
                "lt" => Predicate::Lt(operand),
                _ => Predicate::Lte(operand),
            })
        }
        _ => Err(parse_error(position, format!("unknown predicate '{name}'"))),
    }
}

fn arity(position: usize, step_name: &str, args: &[(usize, Arg)], allowed: &[usize]) -> Result<(), QueryError> {
    if allowed.contains(&args.len()) {
        Ok(())
    } else {
        Err(parse_error(position, format!("{step_name}() does not take {} argument(s)", args.len())))
    }
}

fn step(position: usize, step_name: &str, args: Vec<(usize, Arg)>) -> Result<Vec<Step>, QueryError> {
    let no_args = |step: Step| -> Result<Vec<Step>, QueryError> {
        arity(position, step_name, &args, &[0])?;
        Ok(vec![step])
    };

    match step_name {
        "outV" => no_args(Step::OutV),
        "inV" => no_args(Step::InV),
        "bothV" => no_args(Step::BothV),
        "otherV" => no_args(Step::OtherV),
        "dedup" => no_args(Step::Dedup),
        "out" => Ok(vec![Step::Out(names(args)?)]),
        "in" => Ok(vec![Step::In(names(args)?)]),
        "both" => Ok(vec![Step::Both(names(args)?)]),
        "outE" => Ok(vec![Step::OutE(names(args)?)]),
        "inE" => Ok(vec![Step::InE(names(args)?)]),
        "bothE" => Ok(vec![Step::BothE(names(args)?)]),
        "hasLabel" => {
            if args.is_empty() {
                return Err(parse_error(position, "hasLabel() needs at least one label"));
            }
            Ok(vec![Step::HasLabel(names(args)?)])
        }
        "hasNot" | "as" | "select" => {
            arity(position, step_name, &args, &[1])?;
            let mut given = names(args)?;
            let single = given.remove(0);
            Ok(vec![match step_name {
                "hasNot" => Step::HasNot(single),
                "as" => Step::As(single),
                _ => Step::Select(single),
            }])
        }
        "has" => {
            arity(position, step_name, &args, &[1, 2, 3])?;
            let mut args = args.into_iter();
            let (p, first) = args
                .next()
                .ok_or_else(|| parse_error(position, "has() needs a key"))?;
            let first = name(p, first)?;
            match (args.next(), args.next()) {
                (None, _) => Ok(vec![Step::Has {
                    key: first,
                    predicate: None,
                }]),
                (Some((p, value)), None) => Ok(vec![Step::Has {
                    key: first,
                    predicate: Some(predicate(p, value)?),
                }]),
                // has(label, key, value)
                (Some((p, key)), Some((p3, value))) => Ok(vec![
                    Step::HasLabel(vec![first]),
                    Step::Has {
                        key: name(p, key)?,
                        predicate: Some(predicate(p3, value)?),
                    },
                ]),
            }
        }
        "limit" => {
            arity(position, step_name, &args, &[1])?;
            match args.into_iter().next() {
                Some((_, Arg::Value(Value::Literal(PropertyValue::Integer(n))))) if n >= 0 => {
                    Ok(vec![Step::Limit(n as usize)])
                }
                Some((p, _)) => Err(parse_error(p, "limit() takes a non-negative integer literal")),
                None => Err(parse_error(position, "limit() takes a non-negative integer literal")),
            }
        }
        "and" | "or" => {
            if args.is_empty() {
                return Err(parse_error(position, format!("{step_name}() needs at least one traversal")));
            }
            let subs = args
                .into_iter()
                .map(|(p, arg)| anonymous(p, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(vec![if step_name == "and" { Step::And(subs) } else { Step::Or(subs) }])
        }
        "not" => {
            arity(position, step_name, &args, &[1])?;
            let (p, arg) = args
                .into_iter()
                .next()
                .ok_or_else(|| parse_error(position, "not() needs a traversal"))?;
            Ok(vec![Step::Not(Box::new(anonymous(p, arg)?))])
        }
        other => Err(parse_error(position, format!("unsupported step '{other}'"))),
    }
}

/// A parsed template ready to bind and execute
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    source: String,
    traversal: Traversal,
    placeholders: usize,
}

impl CompiledTemplate {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn traversal(&self) -> &Traversal {
        &self.traversal
    }

    /// Number of `?` placeholders, which is the number of arguments required
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    pub fn bind(&self, args: &[PropertyValue]) -> Result<Traversal, QueryError> {
        if args.len() != self.placeholders {
            return Err(QueryError::TemplateArgumentCountMismatch {
                expected: self.placeholders,
                actual: args.len(),
            });
        }
        Ok(self.traversal.bind(args))
    }
}

impl fmt::Display for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compiles and runs traversal templates
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTemplateEngine;

impl QueryTemplateEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, source: &str) -> Result<CompiledTemplate, QueryError> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            cursor: 0,
            placeholders: 0,
        };
        let traversal = parser.template()?;
        trace!(template = source, placeholders = parser.placeholders, "template compiled");
        Ok(CompiledTemplate {
            source: source.to_string(),
            traversal,
            placeholders: parser.placeholders,
        })
    }

    /// Bind `args` in placeholder order and run against the session's graph
    pub fn execute(
        &self,
        session: &GraphSession,
        template: &CompiledTemplate,
        args: &[PropertyValue],
    ) -> OgmResult<Vec<ElementRef>> {
        let traversal = template.bind(args)?;
        trace!(template = %template, traversal = %traversal, "executing template");
        traversal::execute(session.graph()?, &traversal)
    }

    /// Compile and execute in one go
    pub fn run(&self, session: &GraphSession, source: &str, args: &[PropertyValue]) -> OgmResult<Vec<ElementRef>> {
        let template = self.compile(source)?;
        self.execute(session, &template, args)
    }
}
