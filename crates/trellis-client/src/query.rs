//! Read and write queries with parameter binding.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use trellis_core::value::{self, NativeValue};
use trellis_core::{RdfValue, ReasoningMode, ValueError};

use crate::client::TripleStoreClient;
use crate::error::{BoxError, ClientError, Result};
use crate::session::{write_transaction, TxnWrite};
use crate::transport::{Cursor, PreparedQuery};

/// Query text plus parameters still in native form.
///
/// ```
/// use trellis_client::{sparql, NativeValue};
///
/// let q = sparql("SELECT ?name WHERE { ?person <http://xmlns.com/foaf/0.1/name> ?name }")
///     .param("person", NativeValue::uri("http://example.org/alice"));
/// assert_eq!(q.text(), "SELECT ?name WHERE { ?person <http://xmlns.com/foaf/0.1/name> ?name }");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Sparql {
    text: String,
    named: Vec<(String, NativeValue)>,
    positional: Vec<NativeValue>,
}

/// Start building a query.
pub fn sparql(text: impl Into<String>) -> Sparql {
    Sparql {
        text: text.into(),
        named: Vec::new(),
        positional: Vec::new(),
    }
}

impl Sparql {
    /// Bind a named parameter. A leading `?` or `$` is ignored.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        let name = name.into();
        let name = name.trim_start_matches(['?', '$']).to_string();
        self.named.push((name, value.into()));
        self
    }

    /// Bind the next positional parameter.
    pub fn arg(mut self, value: impl Into<NativeValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Convert every parameter to the value model.
    ///
    /// Later bindings of the same name replace earlier ones.
    pub fn prepare(&self, reasoning: ReasoningMode) -> Result<PreparedQuery> {
        let mut named = IndexMap::with_capacity(self.named.len());
        for (name, v) in &self.named {
            named.insert(name.clone(), bind(name, v)?);
        }
        let positional = self
            .positional
            .iter()
            .enumerate()
            .map(|(i, v)| bind(&(i + 1).to_string(), v))
            .collect::<Result<Vec<_>>>()?;

        Ok(PreparedQuery {
            text: self.text.clone(),
            named,
            positional,
            reasoning,
        })
    }
}

impl From<&str> for Sparql {
    fn from(text: &str) -> Self {
        sparql(text)
    }
}

impl From<String> for Sparql {
    fn from(text: String) -> Self {
        sparql(text)
    }
}

fn bind(name: &str, v: &NativeValue) -> Result<RdfValue> {
    value::to_rdf(v).map_err(|e| match e {
        ValueError::Unsupported { type_name } => ClientError::UnsupportedParameterType {
            name: name.to_string(),
            type_name,
        },
        other => ClientError::ConversionFailure(other),
    })
}

// ── Rows ─────────────────────────────────────────────────────────

/// One result row: variable name to value, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    bindings: IndexMap<String, RdfValue>,
}

impl Row {
    /// Pair values with variable names. Missing trailing values are unbound;
    /// values past the last variable are ignored.
    pub fn new(variables: &[String], values: Vec<RdfValue>) -> Self {
        let mut values = values.into_iter();
        let bindings = variables
            .iter()
            .map(|var| (var.clone(), values.next().unwrap_or(RdfValue::Unbound)))
            .collect();
        Self { bindings }
    }

    pub fn get(&self, variable: &str) -> Option<&RdfValue> {
        self.bindings.get(variable)
    }

    /// The value of `variable` as a native value; `None` if absent or unbound.
    pub fn native(&self, variable: &str) -> Result<Option<NativeValue>> {
        match self.bindings.get(variable) {
            Some(v) => Ok(value::from_rdf(v)?),
            None => Ok(None),
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RdfValue)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Render as a JSON object of native values.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::with_capacity(self.bindings.len());
        for (k, v) in &self.bindings {
            map.insert(k.clone(), value::to_json(v)?);
        }
        Ok(serde_json::Value::Object(map))
    }
}

// ── Execution ────────────────────────────────────────────────────

impl TripleStoreClient {
    /// Run a read query, calling `handler` once per row in server order.
    ///
    /// Rows are pulled lazily. A handler error stops iteration and is
    /// returned as [`ClientError::RowHandler`]. The cursor is closed before
    /// the connection goes back to the pool. Returns the number of rows
    /// handled.
    pub async fn query<F, E>(&self, q: impl Into<Sparql>, mut handler: F) -> Result<usize>
    where
        F: FnMut(Row) -> std::result::Result<(), E> + Send,
        E: Into<BoxError>,
    {
        self.run_select(q.into(), move |row| {
            handler(row).map_err(|e| ClientError::RowHandler(e.into()))
        })
        .await
    }

    /// Like [`query`](Self::query), but deserializes each row into `T`,
    /// matching struct fields to variable names.
    pub async fn each<T, F, E>(&self, q: impl Into<Sparql>, mut handler: F) -> Result<usize>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> std::result::Result<(), E> + Send,
        E: Into<BoxError>,
    {
        self.run_select(q.into(), move |row| {
            let bound: T = serde_json::from_value(row.to_json()?)
                .map_err(|e| ValueError::Shape(e.to_string()))?;
            handler(bound).map_err(|e| ClientError::RowHandler(e.into()))
        })
        .await
    }

    /// Run a read query and collect every row.
    pub async fn select(&self, q: impl Into<Sparql>) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.run_select(q.into(), |row| {
            rows.push(row);
            Ok(())
        })
        .await?;
        Ok(rows)
    }

    /// Run a write query in its own transaction.
    ///
    /// Returns once the server has committed. A failure after `begin` is
    /// rolled back before the connection is released.
    pub async fn update(&self, q: impl Into<Sparql>) -> Result<()> {
        let q = q.into();
        let reasoning = self.pool().config().reasoning;
        self.pool()
            .with_connection(|mut conn| async move {
                let prepared = q.prepare(reasoning)?;
                tracing::debug!(connection = %conn.id(), params = prepared.named.len(), "Executing update");
                write_transaction(&mut conn, TxnWrite::Update(&prepared)).await
            })
            .await
    }

    async fn run_select<F>(&self, q: Sparql, mut on_row: F) -> Result<usize>
    where
        F: FnMut(Row) -> Result<()>,
    {
        let reasoning = self.pool().config().reasoning;
        self.pool()
            .with_connection(|mut conn| async move {
                let prepared = q.prepare(reasoning)?;
                tracing::debug!(connection = %conn.id(), params = prepared.named.len(), "Executing query");

                let mut cursor = conn
                    .select(&prepared)
                    .await
                    .map_err(ClientError::operation("query"))?;
                let drained = drain(cursor.as_mut(), &mut on_row).await;
                let closed = cursor.close().await;
                drop(cursor);

                let count = drained?;
                closed.map_err(ClientError::operation("close cursor"))?;
                Ok(count)
            })
            .await
    }
}

async fn drain<C, F>(cursor: &mut C, on_row: &mut F) -> Result<usize>
where
    C: Cursor + ?Sized,
    F: FnMut(Row) -> Result<()>,
{
    let variables = cursor.variables().to_vec();
    let mut count = 0;
    while let Some(values) = cursor
        .next_row()
        .await
        .map_err(ClientError::operation("fetch row"))?
    {
        if values.len() > variables.len() {
            return Err(ValueError::Shape(format!(
                "row {} has {} values for {} variables",
                count,
                values.len(),
                variables.len()
            ))
            .into());
        }
        on_row(Row::new(&variables, values))?;
        count += 1;
    }
    Ok(count)
}
