//! Step-by-step evaluation of a bound traversal

use super::{Predicate, Step, Traversal, Value};
use crate::errors::{OgmResult, QueryError};
use crate::store::{ElementRef, GraphHandle};
use crate::value_objects::{Direction, ElementId, PropertyValue};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Clone)]
struct Traverser {
    element: ElementRef,
    /// Vertex the current edge was reached from
    from: Option<ElementId>,
    aliases: IndexMap<String, ElementRef>,
}

impl Traverser {
    fn start(element: ElementRef) -> Self {
        Self {
            element,
            from: None,
            aliases: IndexMap::new(),
        }
    }

    fn moved(&self, element: ElementRef, from: Option<ElementId>) -> Self {
        Self {
            element,
            from,
            aliases: self.aliases.clone(),
        }
    }
}

/// Run `traversal` against `graph` and return the elements it ends on
///
/// The traversal must be fully bound; a leftover slot fails with
/// `UnboundPlaceholder`. Results keep traversal order and may repeat unless
/// the traversal deduplicates.
pub fn execute(graph: &dyn GraphHandle, traversal: &Traversal) -> OgmResult<Vec<ElementRef>> {
    let traversers = run(graph, &traversal.steps, Vec::new())?;
    trace!(traversal = %traversal, results = traversers.len(), "traversal executed");
    Ok(traversers.into_iter().map(|t| t.element).collect())
}

fn run(graph: &dyn GraphHandle, steps: &[Step], mut traversers: Vec<Traverser>) -> OgmResult<Vec<Traverser>> {
    let mut index = 0;
    while index < steps.len() {
        let step = &steps[index];
        index += 1;

        traversers = match step {
            Step::V(ids) => {
                // V() followed by an equality `has` is served from the property index
                if let (true, Some(Step::Has { key, predicate: Some(Predicate::Eq(Value::Literal(value))) })) =
                    (ids.is_empty(), steps.get(index))
                {
                    if !value.is_null() {
                        index += 1;
                        graph
                            .vertices_by_property(key, value)?
                            .into_iter()
                            .map(|id| Traverser::start(ElementRef::Vertex(id)))
                            .collect()
                    } else {
                        source(graph, ids, true)?
                    }
                } else {
                    source(graph, ids, true)?
                }
            }
            Step::E(ids) => source(graph, ids, false)?,
            Step::Has { key, predicate } => filter(traversers, |t| {
                let value = graph.property(t.element, key)?;
                Ok(match predicate {
                    Some(predicate) => predicate.test(value.as_ref())?,
                    None => value.is_some_and(|v| !v.is_null()),
                })
            })?,
            Step::HasLabel(labels) => filter(traversers, |t| {
                let label = graph.label(t.element)?;
                Ok(label.is_some_and(|l| labels.iter().any(|wanted| *wanted == l)))
            })?,
            Step::HasNot(key) => filter(traversers, |t| {
                Ok(graph.property(t.element, key)?.map_or(true, |v| v.is_null()))
            })?,
            Step::Out(labels) => adjacent_vertices(graph, traversers, Direction::Out, labels)?,
            Step::In(labels) => adjacent_vertices(graph, traversers, Direction::In, labels)?,
            Step::Both(labels) => adjacent_vertices(graph, traversers, Direction::Both, labels)?,
            Step::OutE(labels) => incident(graph, traversers, Direction::Out, labels)?,
            Step::InE(labels) => incident(graph, traversers, Direction::In, labels)?,
            Step::BothE(labels) => incident(graph, traversers, Direction::Both, labels)?,
            Step::OutV => edge_vertices(graph, traversers, Some(Direction::Out))?,
            Step::InV => edge_vertices(graph, traversers, Some(Direction::In))?,
            Step::BothV => edge_vertices(graph, traversers, None)?,
            Step::OtherV => {
                let mut next = Vec::new();
                for t in traversers {
                    if let (ElementRef::Edge(id), Some(from)) = (t.element, t.from) {
                        if let Some(edge) = graph.edge(id)? {
                            next.push(t.moved(ElementRef::Vertex(edge.other_end(from)), None));
                        }
                    }
                }
                next
            }
            Step::As(alias) => traversers
                .into_iter()
                .map(|mut t| {
                    t.aliases.insert(alias.clone(), t.element);
                    t
                })
                .collect(),
            Step::Select(alias) => traversers
                .into_iter()
                .map(|t| match t.aliases.get(alias) {
                    Some(element) => Ok(t.moved(*element, None)),
                    None => Err(QueryError::UnknownAlias(alias.clone())),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Step::Dedup => {
                let mut seen = HashSet::new();
                traversers.into_iter().filter(|t| seen.insert(t.element)).collect()
            }
            Step::Limit(n) => {
                traversers.truncate(*n);
                traversers
            }
            Step::And(subs) => filter(traversers, |t| {
                for sub in subs {
                    if run(graph, &sub.steps, vec![t.clone()])?.is_empty() {
                        return Ok(false);
                    }
                }
                Ok(true)
            })?,
            Step::Or(subs) => filter(traversers, |t| {
                for sub in subs {
                    if !run(graph, &sub.steps, vec![t.clone()])?.is_empty() {
                        return Ok(true);
                    }
                }
                Ok(false)
            })?,
            Step::Not(sub) => filter(traversers, |t| Ok(run(graph, &sub.steps, vec![t.clone()])?.is_empty()))?,
        };

        if traversers.is_empty() && !matches!(steps.get(index), Some(Step::V(_) | Step::E(_))) {
            break;
        }
    }
    Ok(traversers)
}

fn source(graph: &dyn GraphHandle, ids: &[Value], vertices: bool) -> OgmResult<Vec<Traverser>> {
    let found = if ids.is_empty() {
        if vertices {
            graph.vertices(None)?
        } else {
            graph.edges(None)?
        }
    } else {
        let mut found = Vec::new();
        for value in ids {
            let id = element_id(value.literal()?)?;
            let exists = if vertices {
                graph.vertex(id)?.is_some()
            } else {
                graph.edge(id)?.is_some()
            };
            if exists {
                found.push(id);
            }
        }
        found
    };

    Ok(found
        .into_iter()
        .map(|id| {
            Traverser::start(if vertices {
                ElementRef::Vertex(id)
            } else {
                ElementRef::Edge(id)
            })
        })
        .collect())
}

fn element_id(value: &PropertyValue) -> Result<ElementId, QueryError> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| QueryError::InvalidArgument {
            method: "V".to_string(),
            reason: format!("{value} is not an element id"),
        })
}

fn filter(
    traversers: Vec<Traverser>,
    mut keep: impl FnMut(&Traverser) -> OgmResult<bool>,
) -> OgmResult<Vec<Traverser>> {
    let mut kept = Vec::with_capacity(traversers.len());
    for t in traversers {
        if keep(&t)? {
            kept.push(t);
        }
    }
    Ok(kept)
}

fn edges_of(
    graph: &dyn GraphHandle,
    vertex: ElementId,
    direction: Direction,
    labels: &[String],
) -> OgmResult<Vec<ElementId>> {
    if labels.is_empty() {
        return Ok(graph.incident_edges(vertex, direction, None)?);
    }
    let mut edges = Vec::new();
    for label in labels {
        edges.extend(graph.incident_edges(vertex, direction, Some(label))?);
    }
    Ok(edges)
}

fn incident(
    graph: &dyn GraphHandle,
    traversers: Vec<Traverser>,
    direction: Direction,
    labels: &[String],
) -> OgmResult<Vec<Traverser>> {
    let mut next = Vec::new();
    for t in traversers {
        let ElementRef::Vertex(vertex) = t.element else {
            continue;
        };
        for edge in edges_of(graph, vertex, direction, labels)? {
            next.push(t.moved(ElementRef::Edge(edge), Some(vertex)));
        }
    }
    Ok(next)
}

fn adjacent_vertices(
    graph: &dyn GraphHandle,
    traversers: Vec<Traverser>,
    direction: Direction,
    labels: &[String],
) -> OgmResult<Vec<Traverser>> {
    let mut next = Vec::new();
    for t in traversers {
        let ElementRef::Vertex(vertex) = t.element else {
            continue;
        };
        for edge_id in edges_of(graph, vertex, direction, labels)? {
            if let Some(edge) = graph.edge(edge_id)? {
                next.push(t.moved(ElementRef::Vertex(edge.other_end(vertex)), None));
            }
        }
    }
    Ok(next)
}

/// `Some(Out)` yields the tail, `Some(In)` the head, `None` both
fn edge_vertices(
    graph: &dyn GraphHandle,
    traversers: Vec<Traverser>,
    end: Option<Direction>,
) -> OgmResult<Vec<Traverser>> {
    let mut next = Vec::new();
    for t in traversers {
        let ElementRef::Edge(id) = t.element else {
            continue;
        };
        let Some(edge) = graph.edge(id)? else {
            continue;
        };
        match end {
            Some(Direction::Out) => next.push(t.moved(ElementRef::Vertex(edge.out_vertex), None)),
            Some(Direction::In) => next.push(t.moved(ElementRef::Vertex(edge.in_vertex), None)),
            _ => {
                next.push(t.moved(ElementRef::Vertex(edge.out_vertex), None));
                next.push(t.moved(ElementRef::Vertex(edge.in_vertex), None));
            }
        }
    }
    Ok(next)
}
