//! RDF value model and conversion from/to native application values.
//!
//! Conversion is an explicit match over [`NativeValue`]: every supported
//! native type has one case, and anything else arrives as
//! [`NativeValue::Unsupported`] and is rejected.

use std::fmt;
use std::num::IntErrorKind;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::vocab::xsd;

// ── IRIs ─────────────────────────────────────────────────────────

/// A validated absolute IRI identifying a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iri(String);

impl Iri {
    /// Parse and validate an absolute IRI.
    pub fn parse(iri: impl Into<String>) -> Result<Self, ValueError> {
        let iri = iri.into();
        let checked = oxiri::Iri::parse(iri.as_str())
            .map(|_| ())
            .map_err(|e| e.to_string());
        match checked {
            Ok(()) => Ok(Self(iri)),
            Err(reason) => Err(ValueError::InvalidIri { iri, reason }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl TryFrom<String> for Iri {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Iri> for String {
    fn from(iri: Iri) -> Self {
        iri.0
    }
}

// ── Literals ─────────────────────────────────────────────────────

/// A literal: a lexical form plus an optional datatype.
///
/// A literal without a datatype is a plain literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    lexical: String,
    datatype: Option<Iri>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: Iri) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype),
        }
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub fn datatype(&self) -> Option<&Iri> {
        self.datatype.as_ref()
    }

    pub fn is_plain(&self) -> bool {
        self.datatype.is_none()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.lexical)?;
        if let Some(dt) = &self.datatype {
            write!(f, "^^{dt}")?;
        }
        Ok(())
    }
}

// ── RDF values ───────────────────────────────────────────────────

/// A value in the triple store's value model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RdfValue {
    Resource(Iri),
    Literal(Literal),
    /// A query variable with no binding in this row.
    Unbound,
}

impl RdfValue {
    /// Build a resource from an IRI string.
    pub fn resource(iri: impl Into<String>) -> Result<Self, ValueError> {
        Iri::parse(iri).map(Self::Resource)
    }

    pub fn plain(lexical: impl Into<String>) -> Self {
        Self::Literal(Literal::plain(lexical))
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound)
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Self::Resource(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Resource(_) => "resource",
            Self::Literal(_) => "literal",
            Self::Unbound => "unbound value",
        }
    }
}

impl fmt::Display for RdfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(iri) => iri.fmt(f),
            Self::Literal(lit) => lit.fmt(f),
            Self::Unbound => f.write_str("UNDEF"),
        }
    }
}

impl From<Iri> for RdfValue {
    fn from(iri: Iri) -> Self {
        Self::Resource(iri)
    }
}

impl From<Literal> for RdfValue {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}

// ── Native values ────────────────────────────────────────────────

/// A native application value accepted by the converter.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Plain string; becomes a plain literal.
    Str(String),
    /// IRI string; becomes a resource.
    Uri(String),
    /// Timestamp; becomes an `xsd:dateTime` literal.
    DateTime(DateTime<Utc>),
    /// Integer; becomes an `xsd:integer` literal.
    Integer(i64),
    /// Already in the value model; passed through unchanged.
    Rdf(RdfValue),
    /// A value of a type the converter has no mapping for.
    Unsupported { type_name: &'static str },
}

impl NativeValue {
    pub fn uri(iri: impl Into<String>) -> Self {
        Self::Uri(iri.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Uri(_) => "uri",
            Self::DateTime(_) => "date-time",
            Self::Integer(_) => "integer",
            Self::Rdf(_) => "rdf-value",
            Self::Unsupported { type_name } => *type_name,
        }
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for NativeValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for NativeValue {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<u32> for NativeValue {
    fn from(n: u32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<DateTime<Utc>> for NativeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl From<Iri> for NativeValue {
    fn from(iri: Iri) -> Self {
        Self::Uri(iri.into_string())
    }
}

impl From<RdfValue> for NativeValue {
    fn from(v: RdfValue) -> Self {
        Self::Rdf(v)
    }
}

/// Loosely typed input: strings and integers map, everything else is
/// carried as [`NativeValue::Unsupported`] so binding can report it.
impl From<serde_json::Value> for NativeValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::String(s) => Self::Str(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Unsupported { type_name: "number" },
            },
            Value::Bool(_) => Self::Unsupported {
                type_name: "boolean",
            },
            Value::Null => Self::Unsupported { type_name: "null" },
            Value::Array(_) => Self::Unsupported { type_name: "array" },
            Value::Object(_) => Self::Unsupported { type_name: "object" },
        }
    }
}

// ── Conversion ───────────────────────────────────────────────────

/// Convert a native value into the RDF value model.
pub fn to_rdf(value: &NativeValue) -> Result<RdfValue, ValueError> {
    match value {
        NativeValue::Str(s) => Ok(RdfValue::plain(s.clone())),
        NativeValue::Uri(iri) => RdfValue::resource(iri.clone()),
        NativeValue::DateTime(dt) => Ok(RdfValue::Literal(Literal::typed(
            dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            datatype(xsd::DATE_TIME),
        ))),
        NativeValue::Integer(n) => Ok(RdfValue::Literal(Literal::typed(
            n.to_string(),
            datatype(xsd::INTEGER),
        ))),
        NativeValue::Rdf(v) => Ok(v.clone()),
        NativeValue::Unsupported { type_name } => Err(ValueError::Unsupported {
            type_name: *type_name,
        }),
    }
}

/// Interpret a native value as a resource identifier.
///
/// Strings are read as IRIs; literals and unbound values are rejected.
pub fn to_resource(value: &NativeValue) -> Result<Iri, ValueError> {
    match value {
        NativeValue::Str(s) | NativeValue::Uri(s) => Iri::parse(s.clone()),
        NativeValue::Rdf(RdfValue::Resource(iri)) => Ok(iri.clone()),
        NativeValue::Rdf(other) => Err(ValueError::NotAResource {
            found: other.kind(),
        }),
        NativeValue::Unsupported { type_name } => Err(ValueError::Unsupported {
            type_name: *type_name,
        }),
        other => Err(ValueError::NotAResource {
            found: other.type_name(),
        }),
    }
}

/// Convert an RDF value back into a native value.
///
/// Returns `None` for unbound values. Literals with a datatype the
/// converter does not map are passed through as [`NativeValue::Rdf`].
pub fn from_rdf(value: &RdfValue) -> Result<Option<NativeValue>, ValueError> {
    let lit = match value {
        RdfValue::Unbound => return Ok(None),
        RdfValue::Resource(iri) => return Ok(Some(NativeValue::Uri(iri.as_str().to_string()))),
        RdfValue::Literal(lit) => lit,
    };

    let Some(dt) = lit.datatype() else {
        return Ok(Some(NativeValue::Str(lit.lexical().to_string())));
    };

    let native = match dt.as_str() {
        xsd::STRING => NativeValue::Str(lit.lexical().to_string()),
        d if xsd::INTEGER_FAMILY.contains(&d) => match lit.lexical().trim().parse::<i64>() {
            Ok(n) => NativeValue::Integer(n),
            // xsd:integer is unbounded; keep values past i64 as RDF.
            Err(e)
                if d == xsd::INTEGER
                    && matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) =>
            {
                NativeValue::Rdf(value.clone())
            }
            Err(_) => return Err(malformed(lit)),
        },
        xsd::DATE_TIME => parse_date_time(lit.lexical())
            .map(NativeValue::DateTime)
            .ok_or_else(|| malformed(lit))?,
        _ => NativeValue::Rdf(value.clone()),
    };
    Ok(Some(native))
}

/// Render an RDF value as a native JSON value.
///
/// Integers become numbers; resources, strings, and timestamps become
/// strings; unbound becomes `null`; other literals use their lexical form.
pub fn to_json(value: &RdfValue) -> Result<serde_json::Value, ValueError> {
    use serde_json::Value;
    Ok(match from_rdf(value)? {
        None => Value::Null,
        Some(NativeValue::Integer(n)) => Value::from(n),
        Some(NativeValue::Str(s)) | Some(NativeValue::Uri(s)) => Value::String(s),
        Some(NativeValue::DateTime(dt)) => {
            Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        Some(NativeValue::Rdf(RdfValue::Literal(lit))) => Value::String(lit.lexical().to_string()),
        Some(NativeValue::Rdf(other)) => Value::String(other.to_string()),
        Some(NativeValue::Unsupported { type_name }) => {
            return Err(ValueError::Unsupported { type_name })
        }
    })
}

fn datatype(iri: &'static str) -> Iri {
    Iri(iri.to_string())
}

fn malformed(lit: &Literal) -> ValueError {
    ValueError::MalformedLiteral {
        lexical: lit.lexical().to_string(),
        datatype: lit
            .datatype()
            .map(|d| d.as_str().to_string())
            .unwrap_or_default(),
    }
}

fn parse_date_time(lexical: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(lexical) {
        return Some(dt.with_timezone(&Utc));
    }
    // xsd:dateTime allows a missing timezone; read it as UTC.
    NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
