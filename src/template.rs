//! Query templates with named placeholders and typed parameter bindings.
//!
//! Templates use `{name}` for placeholders and `{{` / `}}` for literal braces,
//! which keeps SPARQL group patterns readable in the `.rq` files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures raised while loading a template or binding parameters into it.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("failed to load query template from {path:?}: {source}")]
    Load {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The template text itself is not well formed.
    #[error("invalid template syntax at byte {offset}: {reason}")]
    Syntax {
        /// Byte offset of the offending character.
        offset: usize,
        /// Human readable description.
        reason: &'static str,
    },
    /// A placeholder in the template has no bound value.
    #[error("missing value for placeholder '{0}'")]
    MissingParameter(String),
    /// A binding names a placeholder the template never declares.
    #[error("parameter '{0}' is not declared by the template")]
    UnknownParameter(String),
    /// A bound value would break the surrounding query syntax.
    #[error("value for '{name}' is not safe to embed in a query: {value:?}")]
    UnsafeValue {
        /// Placeholder name.
        name: String,
        /// Rejected textual form.
        value: String,
    },
}

/// A value bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Identifier-like text (entity ids, language codes).
    Text(String),
    /// Integer literal such as a `LIMIT`.
    Integer(i64),
    /// Decimal literal.
    Decimal(f64),
}

impl ParamValue {
    fn render(&self, name: &str) -> Result<String, TemplateError> {
        match self {
            ParamValue::Text(text) => {
                if is_safe_text(text) {
                    Ok(text.clone())
                } else {
                    Err(TemplateError::UnsafeValue {
                        name: name.to_string(),
                        value: text.clone(),
                    })
                }
            }
            ParamValue::Integer(value) => Ok(value.to_string()),
            ParamValue::Decimal(value) if value.is_finite() => Ok(value.to_string()),
            ParamValue::Decimal(value) => Err(TemplateError::UnsafeValue {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Decimal(value)
    }
}

// Text is spliced verbatim, so only identifier characters get through.
fn is_safe_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
}

/// Named parameters for one query invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBinding {
    values: BTreeMap<String, ParamValue>,
}

impl QueryBinding {
    /// Creates an empty binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a named value, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Looks up a bound value.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed query template. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
    placeholders: BTreeSet<String>,
}

impl QueryTemplate {
    /// Reads and parses a template file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TemplateError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses template text.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut placeholders = BTreeSet::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::Syntax {
                        offset,
                        reason: "unmatched '}' (write '}}' for a literal brace)",
                    })
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::Syntax {
                            offset,
                            reason: "unterminated placeholder",
                        });
                    }
                    if !is_placeholder_name(&name) {
                        return Err(TemplateError::Syntax {
                            offset,
                            reason: "placeholder names must be identifiers",
                        });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    placeholders.insert(name.clone());
                    segments.push(Segment::Placeholder(name));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            segments,
            placeholders,
        })
    }

    /// Names of every placeholder the template declares.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(String::as_str)
    }

    /// Materializes a query, validating `binding` against the declared placeholders.
    pub fn bind(&self, binding: &QueryBinding) -> Result<Query, TemplateError> {
        if let Some(unknown) = binding
            .names()
            .find(|name| !self.placeholders.contains(*name))
        {
            return Err(TemplateError::UnknownParameter(unknown.to_string()));
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = binding
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingParameter(name.clone()))?;
                    out.push_str(&value.render(name)?);
                }
            }
        }
        Ok(Query(out))
    }
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A fully substituted query ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Query body.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PER_KEY: &str = "SELECT ?person WHERE {{ ?person wdt:P735 wd:{qid} . }} LIMIT {limit}";

    #[test]
    fn binds_placeholders_and_unescapes_braces() {
        let template = QueryTemplate::parse(PER_KEY).expect("parse");
        let query = template
            .bind(&QueryBinding::new().with("qid", "Q123").with("limit", 6i64))
            .expect("bind");
        assert_eq!(
            query.as_str(),
            "SELECT ?person WHERE { ?person wdt:P735 wd:Q123 . } LIMIT 6"
        );
    }

    #[test]
    fn reports_declared_placeholders() {
        let template = QueryTemplate::parse(PER_KEY).expect("parse");
        let names: Vec<_> = template.placeholders().collect();
        assert_eq!(names, vec!["limit", "qid"]);
    }

    #[test]
    fn missing_parameter_is_rejected() {
        let template = QueryTemplate::parse(PER_KEY).expect("parse");
        let err = template
            .bind(&QueryBinding::new().with("qid", "Q1"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingParameter(name) if name == "limit"));
    }

    #[test]
    fn undeclared_parameter_is_rejected() {
        let template = QueryTemplate::parse(PER_KEY).expect("parse");
        let err = template
            .bind(
                &QueryBinding::new()
                    .with("qid", "Q1")
                    .with("limit", 6i64)
                    .with("language", "en"),
            )
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownParameter(name) if name == "language"));
    }

    #[test]
    fn values_that_would_break_the_query_are_rejected() {
        let template = QueryTemplate::parse(PER_KEY).expect("parse");
        for hostile in ["Q1 . }} ?x ?y ?z", "Q1\"", "Q1}", "Q1 #", "", "Q1\nLIMIT 1"] {
            let err = template
                .bind(&QueryBinding::new().with("qid", hostile).with("limit", 6i64))
                .unwrap_err();
            assert!(
                matches!(err, TemplateError::UnsafeValue { .. }),
                "accepted {hostile:?}"
            );
        }
    }

    #[test]
    fn non_finite_decimals_are_rejected() {
        let template = QueryTemplate::parse("LIMIT {n}").expect("parse");
        let err = template
            .bind(&QueryBinding::new().with("n", f64::NAN))
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnsafeValue { .. }));
    }

    #[test]
    fn stray_braces_fail_at_parse_time() {
        assert!(matches!(
            QueryTemplate::parse("WHERE { ?s ?p ?o }"),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            QueryTemplate::parse("LIMIT {limit"),
            Err(TemplateError::Syntax { .. })
        ));
        assert!(matches!(
            QueryTemplate::parse("x }"),
            Err(TemplateError::Syntax { offset: 2, .. })
        ));
    }

    #[test]
    fn missing_template_file_is_a_load_error() {
        let err = QueryTemplate::load("does/not/exist.rq").unwrap_err();
        assert!(matches!(err, TemplateError::Load { .. }));
    }
}
