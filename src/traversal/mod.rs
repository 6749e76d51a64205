//! Traversal model
//!
//! A `Traversal` is an ordered list of navigation and filter steps, the shape
//! shared by derived queries and templates. Values inside steps may be
//! positional slots; `bind` replaces them with call arguments before the
//! traversal is executed against a session.

mod executor;

pub use executor::execute;

use crate::errors::QueryError;
use crate::value_objects::PropertyValue;
use std::fmt;

/// A step argument: a literal or the Nth call argument
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(PropertyValue),
    Slot(usize),
}

impl Value {
    pub fn literal(&self) -> Result<&PropertyValue, QueryError> {
        match self {
            Value::Literal(value) => Ok(value),
            Value::Slot(index) => Err(QueryError::UnboundPlaceholder(*index)),
        }
    }

    fn bind(&self, args: &[PropertyValue]) -> Value {
        match self {
            Value::Slot(index) => args
                .get(*index)
                .cloned()
                .map(Value::Literal)
                .unwrap_or_else(|| self.clone()),
            literal => literal.clone(),
        }
    }

    fn max_slot(&self) -> Option<usize> {
        match self {
            Value::Slot(index) => Some(*index),
            Value::Literal(_) => None,
        }
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Self {
        Value::Literal(value)
    }
}

/// Property predicate used by `has` steps
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    Within(Vec<Value>),
    /// List membership or substring
    Containing(Value),
    StartingWith(Value),
    IsNull,
    IsNotNull,
}

impl Predicate {
    fn values(&self) -> Vec<&Value> {
        match self {
            Predicate::Eq(v)
            | Predicate::Neq(v)
            | Predicate::Gt(v)
            | Predicate::Gte(v)
            | Predicate::Lt(v)
            | Predicate::Lte(v)
            | Predicate::Containing(v)
            | Predicate::StartingWith(v) => vec![v],
            Predicate::Between(low, high) => vec![low, high],
            Predicate::Within(values) => values.iter().collect(),
            Predicate::IsNull | Predicate::IsNotNull => Vec::new(),
        }
    }

    fn bind(&self, args: &[PropertyValue]) -> Predicate {
        let b = |v: &Value| v.bind(args);
        match self {
            Predicate::Eq(v) => Predicate::Eq(b(v)),
            Predicate::Neq(v) => Predicate::Neq(b(v)),
            Predicate::Gt(v) => Predicate::Gt(b(v)),
            Predicate::Gte(v) => Predicate::Gte(b(v)),
            Predicate::Lt(v) => Predicate::Lt(b(v)),
            Predicate::Lte(v) => Predicate::Lte(b(v)),
            Predicate::Between(low, high) => Predicate::Between(b(low), b(high)),
            Predicate::Within(values) => Predicate::Within(values.iter().map(b).collect()),
            Predicate::Containing(v) => Predicate::Containing(b(v)),
            Predicate::StartingWith(v) => Predicate::StartingWith(b(v)),
            Predicate::IsNull => Predicate::IsNull,
            Predicate::IsNotNull => Predicate::IsNotNull,
        }
    }

    /// Evaluate against a property that may be absent
    pub fn test(&self, property: Option<&PropertyValue>) -> Result<bool, QueryError> {
        let present = property.filter(|p| !p.is_null());
        Ok(match self {
            Predicate::IsNull => present.is_none(),
            Predicate::IsNotNull => present.is_some(),
            Predicate::Eq(v) => {
                let v = v.literal()?;
                match present {
                    Some(p) => p.loosely_equals(v),
                    None => v.is_null(),
                }
            }
            Predicate::Neq(v) => {
                let v = v.literal()?;
                match present {
                    Some(p) => !p.loosely_equals(v),
                    None => !v.is_null(),
                }
            }
            Predicate::Gt(v) => compare(present, v, |o| o.is_gt())?,
            Predicate::Gte(v) => compare(present, v, |o| o.is_ge())?,
            Predicate::Lt(v) => compare(present, v, |o| o.is_lt())?,
            Predicate::Lte(v) => compare(present, v, |o| o.is_le())?,
            Predicate::Between(low, high) => {
                compare(present, low, |o| o.is_ge())? && compare(present, high, |o| o.is_lt())?
            }
            Predicate::Within(values) => {
                let mut hit = false;
                for v in values {
                    let v = v.literal()?;
                    hit |= present.is_some_and(|p| p.loosely_equals(v));
                }
                hit
            }
            Predicate::Containing(v) => {
                let v = v.literal()?;
                present.is_some_and(|p| p.contains(v))
            }
            Predicate::StartingWith(v) => {
                let v = v.literal()?;
                match (present.and_then(PropertyValue::as_str), v.as_str()) {
                    (Some(p), Some(prefix)) => p.starts_with(prefix),
                    _ => false,
                }
            }
        })
    }
}

fn compare(
    property: Option<&PropertyValue>,
    value: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<bool, QueryError> {
    let value = value.literal()?;
    Ok(property.and_then(|p| p.compare(value)).is_some_and(accept))
}

/// One step of a traversal
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// All vertices, or the vertices with the given ids
    V(Vec<Value>),
    /// All edges, or the edges with the given ids
    E(Vec<Value>),
    /// Keep elements whose property satisfies the predicate; `None` tests presence
    Has { key: String, predicate: Option<Predicate> },
    HasLabel(Vec<String>),
    HasNot(String),
    Out(Vec<String>),
    In(Vec<String>),
    Both(Vec<String>),
    OutE(Vec<String>),
    InE(Vec<String>),
    BothE(Vec<String>),
    OutV,
    InV,
    BothV,
    /// The endpoint opposite to the vertex the edge was reached from
    OtherV,
    As(String),
    Select(String),
    Dedup,
    Limit(usize),
    /// Keep elements for which every sub-traversal yields something
    And(Vec<Traversal>),
    /// Keep elements for which at least one sub-traversal yields something
    Or(Vec<Traversal>),
    /// Keep elements for which the sub-traversal yields nothing
    Not(Box<Traversal>),
}

impl Step {
    fn bind(&self, args: &[PropertyValue]) -> Step {
        match self {
            Step::V(ids) => Step::V(ids.iter().map(|v| v.bind(args)).collect()),
            Step::E(ids) => Step::E(ids.iter().map(|v| v.bind(args)).collect()),
            Step::Has { key, predicate } => Step::Has {
                key: key.clone(),
                predicate: predicate.as_ref().map(|p| p.bind(args)),
            },
            Step::And(subs) => Step::And(subs.iter().map(|t| t.bind(args)).collect()),
            Step::Or(subs) => Step::Or(subs.iter().map(|t| t.bind(args)).collect()),
            Step::Not(sub) => Step::Not(Box::new(sub.bind(args))),
            other => other.clone(),
        }
    }

    fn max_slot(&self) -> Option<usize> {
        match self {
            Step::V(ids) | Step::E(ids) => ids.iter().filter_map(Value::max_slot).max(),
            Step::Has {
                predicate: Some(predicate),
                ..
            } => predicate.values().into_iter().filter_map(Value::max_slot).max(),
            Step::And(subs) | Step::Or(subs) => subs.iter().filter_map(Traversal::max_slot).max(),
            Step::Not(sub) => sub.max_slot(),
            _ => None,
        }
    }
}

/// An ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal {
    pub steps: Vec<Step>,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of distinct positional slots referenced
    pub fn slot_count(&self) -> usize {
        self.max_slot().map_or(0, |max| max + 1)
    }

    fn max_slot(&self) -> Option<usize> {
        self.steps.iter().filter_map(Step::max_slot).max()
    }

    /// Replace slots with `args`; callers check the argument count first
    pub fn bind(&self, args: &[PropertyValue]) -> Traversal {
        Traversal {
            steps: self.steps.iter().map(|s| s.bind(args)).collect(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(value) => write!(f, "{value}"),
            Value::Slot(_) => write!(f, "?"),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn quoted(items: &[String]) -> String {
    items.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(v) => write!(f, "{v}"),
            Predicate::Neq(v) => write!(f, "neq({v})"),
            Predicate::Gt(v) => write!(f, "gt({v})"),
            Predicate::Gte(v) => write!(f, "gte({v})"),
            Predicate::Lt(v) => write!(f, "lt({v})"),
            Predicate::Lte(v) => write!(f, "lte({v})"),
            Predicate::Between(low, high) => write!(f, "between({low}, {high})"),
            Predicate::Within(values) => write!(f, "within({})", join(values)),
            Predicate::Containing(v) => write!(f, "containing({v})"),
            Predicate::StartingWith(v) => write!(f, "startingWith({v})"),
            Predicate::IsNull => write!(f, "null"),
            Predicate::IsNotNull => write!(f, "notNull()"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::V(ids) => write!(f, "V({})", join(ids)),
            Step::E(ids) => write!(f, "E({})", join(ids)),
            Step::Has { key, predicate: None } => write!(f, "has('{key}')"),
            Step::Has {
                key,
                predicate: Some(p),
            } => write!(f, "has('{key}', {p})"),
            Step::HasLabel(labels) => write!(f, "hasLabel({})", quoted(labels)),
            Step::HasNot(key) => write!(f, "hasNot('{key}')"),
            Step::Out(labels) => write!(f, "out({})", quoted(labels)),
            Step::In(labels) => write!(f, "in({})", quoted(labels)),
            Step::Both(labels) => write!(f, "both({})", quoted(labels)),
            Step::OutE(labels) => write!(f, "outE({})", quoted(labels)),
            Step::InE(labels) => write!(f, "inE({})", quoted(labels)),
            Step::BothE(labels) => write!(f, "bothE({})", quoted(labels)),
            Step::OutV => write!(f, "outV()"),
            Step::InV => write!(f, "inV()"),
            Step::BothV => write!(f, "bothV()"),
            Step::OtherV => write!(f, "otherV()"),
            Step::As(alias) => write!(f, "as('{alias}')"),
            Step::Select(alias) => write!(f, "select('{alias}')"),
            Step::Dedup => write!(f, "dedup()"),
            Step::Limit(n) => write!(f, "limit({n})"),
            Step::And(subs) => write!(f, "and({})", anonymous(subs)),
            Step::Or(subs) => write!(f, "or({})", anonymous(subs)),
            Step::Not(sub) => write!(f, "not(__{})", steps_suffix(sub)),
        }
    }
}

fn steps_suffix(traversal: &Traversal) -> String {
    traversal.steps.iter().map(|s| format!(".{s}")).collect()
}

fn anonymous(subs: &[Traversal]) -> String {
    subs.iter()
        .map(|t| format!("__{}", steps_suffix(t)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", steps_suffix(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count_and_bind() {
        let traversal = Traversal::new()
            .then(Step::V(Vec::new()))
            .then(Step::Has {
                key: "firstName".to_string(),
                predicate: Some(Predicate::Eq(Value::Slot(0))),
            })
            .then(Step::Or(vec![Traversal::new().then(Step::Has {
                key: "age".to_string(),
                predicate: Some(Predicate::Between(Value::Slot(1), Value::Slot(2))),
            })]));

        assert_eq!(traversal.slot_count(), 3);

        let bound = traversal.bind(&["Graham".into(), 30.into(), 40.into()]);
        assert_eq!(bound.slot_count(), 0);
        assert_eq!(
            bound.to_string(),
            "g.V().has('firstName', 'Graham').or(__.has('age', between(30, 40)))"
        );
    }

    #[test]
    fn test_predicates_on_missing_properties() {
        assert!(Predicate::IsNull.test(None).unwrap());
        assert!(Predicate::IsNull.test(Some(&PropertyValue::Null)).unwrap());
        assert!(!Predicate::Eq(Value::Literal("x".into())).test(None).unwrap());
        assert!(!Predicate::Gt(Value::Literal(1.into())).test(None).unwrap());
        assert!(Predicate::Neq(Value::Literal("x".into())).test(None).unwrap());
    }

    #[test]
    fn test_range_predicates() {
        let age = PropertyValue::Integer(35);
        let between = Predicate::Between(Value::Literal(30.into()), Value::Literal(40.into()));
        assert!(between.test(Some(&age)).unwrap());
        assert!(Predicate::Gte(Value::Literal(35.0.into())).test(Some(&age)).unwrap());
        assert!(!Predicate::Lt(Value::Literal(35.into())).test(Some(&age)).unwrap());
    }

    #[test]
    fn test_unbound_slot_is_an_error() {
        let result = Predicate::Eq(Value::Slot(0)).test(Some(&"x".into()));
        assert_eq!(result, Err(QueryError::UnboundPlaceholder(0)));
    }
}
