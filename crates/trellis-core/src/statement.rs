//! Statements, insert batches, and removal patterns.
//!
//! Callers describe writes with loosely typed inputs ([`TripleInput`],
//! [`RemovePattern`]); these are resolved into the strict forms
//! ([`Statement`], [`StatementPattern`]) before anything reaches a server.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InputError, ValueError};
use crate::value::{self, Iri, NativeValue, RdfValue};

/// A fully resolved statement. Subject and predicate are always resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: RdfValue,
    pub graph: Option<Iri>,
}

impl Statement {
    pub fn new(
        subject: Iri,
        predicate: Iri,
        object: RdfValue,
        graph: Option<Iri>,
    ) -> Result<Self, ValueError> {
        if !object.is_bound() {
            return Err(ValueError::Unbound { position: "object" });
        }
        Ok(Self {
            subject,
            predicate,
            object,
            graph,
        })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(g) = &self.graph {
            write!(f, " {g}")?;
        }
        f.write_str(" .")
    }
}

// ── Insert input ─────────────────────────────────────────────────

/// One triple as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleInput {
    pub subject: String,
    pub predicate: String,
    pub object: NativeValue,
    pub graph: Option<String>,
}

impl TripleInput {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<NativeValue>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: None,
        }
    }

    /// Scope the triple to a named graph.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Resolve into a [`Statement`], classifying the object by its native type.
    pub fn to_statement(&self) -> Result<Statement, ValueError> {
        let graph = self.graph.clone().map(Iri::parse).transpose()?;
        Statement::new(
            Iri::parse(self.subject.clone())?,
            Iri::parse(self.predicate.clone())?,
            value::to_rdf(&self.object)?,
            graph,
        )
    }
}

impl<S, P, O> From<(S, P, O)> for TripleInput
where
    S: Into<String>,
    P: Into<String>,
    O: Into<NativeValue>,
{
    fn from((s, p, o): (S, P, O)) -> Self {
        Self::new(s, p, o)
    }
}

/// Insert input: a single triple or an ordered batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Triples {
    One(TripleInput),
    Many(Vec<TripleInput>),
}

impl Triples {
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<TripleInput> {
        match self {
            Self::One(t) => vec![t],
            Self::Many(v) => v,
        }
    }

    /// Resolve every triple, in order. Fails on the first bad triple.
    pub fn to_statements(&self) -> Result<Vec<Statement>, ValueError> {
        match self {
            Self::One(t) => Ok(vec![t.to_statement()?]),
            Self::Many(v) => v.iter().map(TripleInput::to_statement).collect(),
        }
    }

    /// Accept `[s, p, o]` or `[[s, p, o], ...]`.
    ///
    /// Subject and predicate must be strings; the object goes through the
    /// JSON mapping of [`NativeValue`]. Entries of any other length are
    /// rejected rather than skipped.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, InputError> {
        let serde_json::Value::Array(items) = value else {
            return Err(InputError::NotATriple { index: 0 });
        };

        let nested = items.iter().any(serde_json::Value::is_array);
        if !nested && !items.is_empty() {
            return json_triple(0, items).map(Self::One);
        }

        items
            .iter()
            .enumerate()
            .map(|(index, item)| match item {
                serde_json::Value::Array(parts) => json_triple(index, parts),
                _ => Err(InputError::NotATriple { index }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Many)
    }
}

impl From<TripleInput> for Triples {
    fn from(t: TripleInput) -> Self {
        Self::One(t)
    }
}

impl From<Vec<TripleInput>> for Triples {
    fn from(v: Vec<TripleInput>) -> Self {
        Self::Many(v)
    }
}

fn json_triple(index: usize, parts: &[serde_json::Value]) -> Result<TripleInput, InputError> {
    let [s, p, o] = parts else {
        return Err(InputError::TripleArity {
            index,
            len: parts.len(),
        });
    };
    let subject = s.as_str().ok_or(InputError::NotAString {
        index,
        position: "subject",
    })?;
    let predicate = p.as_str().ok_or(InputError::NotAString {
        index,
        position: "predicate",
    })?;
    Ok(TripleInput::new(subject, predicate, o.clone()))
}

// ── Removal ──────────────────────────────────────────────────────

/// A caller-supplied removal spec. `None` in a field means "match any".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovePattern {
    pub subject: Option<NativeValue>,
    pub predicate: Option<NativeValue>,
    pub object: Option<NativeValue>,
    pub graph: Option<NativeValue>,
}

impl RemovePattern {
    /// A pattern matching every statement.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<NativeValue>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<NativeValue>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn object(mut self, object: impl Into<NativeValue>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn graph(mut self, graph: impl Into<NativeValue>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Build from positional `(subject, predicate, object, graph)` fields.
    ///
    /// Exactly four fields are required; each may be `None`.
    pub fn from_args(args: Vec<Option<NativeValue>>) -> Result<Self, InputError> {
        let len = args.len();
        let Ok([subject, predicate, object, graph]) = <[Option<NativeValue>; 4]>::try_from(args)
        else {
            return Err(InputError::RemoveArity(len));
        };
        Ok(Self {
            subject,
            predicate,
            object,
            graph,
        })
    }

    /// Resolve into a [`StatementPattern`].
    ///
    /// Subject, predicate, and graph become resources; the object becomes a
    /// resource for URIs and a literal otherwise.
    pub fn resolve(&self) -> Result<StatementPattern, ValueError> {
        let object = match &self.object {
            Some(o) => {
                let v = value::to_rdf(o)?;
                if !v.is_bound() {
                    return Err(ValueError::Unbound { position: "object" });
                }
                Some(v)
            }
            None => None,
        };
        Ok(StatementPattern {
            subject: self.subject.as_ref().map(value::to_resource).transpose()?,
            predicate: self.predicate.as_ref().map(value::to_resource).transpose()?,
            object,
            graph: self.graph.as_ref().map(value::to_resource).transpose()?,
        })
    }
}

/// A resolved removal pattern handed to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPattern {
    pub subject: Option<Iri>,
    pub predicate: Option<Iri>,
    pub object: Option<RdfValue>,
    pub graph: Option<Iri>,
}

impl StatementPattern {
    pub fn is_unconstrained(&self) -> bool {
        self.subject.is_none()
            && self.predicate.is_none()
            && self.object.is_none()
            && self.graph.is_none()
    }

    pub fn matches(&self, st: &Statement) -> bool {
        self.subject.as_ref().map_or(true, |s| *s == st.subject)
            && self.predicate.as_ref().map_or(true, |p| *p == st.predicate)
            && self.object.as_ref().map_or(true, |o| *o == st.object)
            && self
                .graph
                .as_ref()
                .map_or(true, |g| st.graph.as_ref() == Some(g))
    }
}

impl fmt::Display for StatementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn term<T: fmt::Display>(f: &mut fmt::Formatter<'_>, t: &Option<T>) -> fmt::Result {
            match t {
                Some(t) => write!(f, "{t}"),
                None => f.write_str("*"),
            }
        }
        term(f, &self.subject)?;
        f.write_str(" ")?;
        term(f, &self.predicate)?;
        f.write_str(" ")?;
        term(f, &self.object)?;
        f.write_str(" ")?;
        term(f, &self.graph)
    }
}
