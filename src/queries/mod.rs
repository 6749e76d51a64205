//! Graph queries
//!
//! Two ways to obtain a traversal for a repository method: derive it from the
//! method name, or compile a hand-written template. Both produce a
//! `Traversal` with argument slots that is bound per call and executed
//! against the session's graph handle.

mod derivation;
mod template;

pub use derivation::{DerivedQuery, QueryDerivationEngine, QuerySubject};
pub use template::{CompiledTemplate, QueryTemplateEngine};
