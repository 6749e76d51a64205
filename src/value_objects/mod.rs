//! Graph value objects
//!
//! Value objects are immutable types shared by every layer of the mapper: element
//! identifiers, typed property values and the small enums that describe how a
//! relationship is stored and traversed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Native identifier of a graph element (vertex or edge)
///
/// Vertices and edges share a single id space, so an id alone is enough to
/// address an element inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Allocate a fresh element id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A typed property value stored on a vertex or an edge
///
/// Enum values are stored by name as strings, enum collections as lists of
/// strings. Integers and floats compare numerically with each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum PropertyValue {
    /// Absent or explicitly empty value
    #[default]
    Null,
    /// Boolean flag
    Boolean(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string (also used for enum names)
    String(String),
    /// Point in time
    Date(DateTime<Utc>),
    /// Ordered collection of values
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Date(_) => "date",
            PropertyValue::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Equality used by traversal filters: numeric values compare across
    /// integer and float, everything else compares structurally.
    pub fn loosely_equals(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Integer(_) | PropertyValue::Float(_), PropertyValue::Integer(_) | PropertyValue::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (PropertyValue::List(a), PropertyValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            _ => self == other,
        }
    }

    /// Ordering used by range predicates; `None` when the values are not comparable
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::Date(b)) => Some(a.cmp(b)),
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// List membership for lists, substring match for strings
    pub fn contains(&self, needle: &PropertyValue) -> bool {
        match (self, needle) {
            (PropertyValue::List(items), _) => items.iter().any(|item| item.loosely_equals(needle)),
            (PropertyValue::String(haystack), PropertyValue::String(n)) => haystack.contains(n.as_str()),
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::String(s) => write!(f, "'{s}'"),
            PropertyValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            PropertyValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<ElementId> for PropertyValue {
    fn from(value: ElementId) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Direction of an edge relative to the vertex it is seen from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    /// The vertex is the edge's tail (out-vertex)
    #[default]
    Out,
    /// The vertex is the edge's head (in-vertex)
    In,
    /// Either end
    Both,
}

impl Direction {
    /// The same edge seen from the other end
    pub fn reverse(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }
}

/// How many targets a relationship field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one target; saving replaces the previous edge
    Single,
    /// Unordered targets without duplicate edges
    Set,
    /// Ordered targets without duplicate edges
    List,
}

impl Cardinality {
    pub fn is_collection(self) -> bool {
        !matches!(self, Cardinality::Single)
    }
}

/// What deleting the owning vertex does to a relationship's targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Delete the related entities together with the owner
    Cascade,
    /// Remove the connecting edges and keep the related entities
    #[default]
    Detach,
    /// Refuse to delete the owner while related edges exist
    Restrict,
}

/// When a relationship is loaded during hydration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Hydrated together with the owner
    #[default]
    Eager,
    /// Left unloaded; saving the owner does not touch its edges
    Lazy,
}

/// How collection relationships are reconciled on save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SaveMode {
    /// Add missing edges, keep existing ones
    #[default]
    Merge,
    /// Make the stored edges match the collection exactly
    ReplaceAll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_compare_across_variants() {
        let int = PropertyValue::Integer(3);
        let float = PropertyValue::Float(3.0);

        assert!(int.loosely_equals(&float));
        assert_eq!(int.compare(&PropertyValue::Float(4.5)), Some(Ordering::Less));
        assert_eq!(PropertyValue::from("a").compare(&PropertyValue::Integer(1)), None);
    }

    #[test]
    fn test_contains_on_lists_and_strings() {
        let vehicles = PropertyValue::from(vec!["CAR", "MOTORBIKE"]);
        assert!(vehicles.contains(&"CAR".into()));
        assert!(!vehicles.contains(&"BOAT".into()));

        let street = PropertyValue::from("Scenic Dr");
        assert!(street.contains(&"nic".into()));
    }

    #[test]
    fn test_element_id_round_trips_through_string() {
        let id = ElementId::new();
        let parsed: ElementId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_option_into_property_value() {
        let none: Option<i64> = None;
        assert_eq!(PropertyValue::from(none), PropertyValue::Null);
        assert_eq!(PropertyValue::from(Some(7)), PropertyValue::Integer(7));
    }
}
