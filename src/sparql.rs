//! SPARQL JSON result documents as returned by the query service.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level `application/sparql-results+json` document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SparqlResults {
    /// Result rows container.
    pub results: ResultBindings,
}

/// The `results` member holding the binding rows.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultBindings {
    /// Rows in the order the service produced them.
    pub bindings: Vec<BindingRow>,
}

/// One result row: variable name to bound value. Unbound variables are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct BindingRow(HashMap<String, BoundValue>);

/// A single bound RDF term. Only the lexical value is used downstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoundValue {
    /// Lexical form of the term.
    #[serde(default)]
    pub value: String,
}

impl SparqlResults {
    /// Parses a response body.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Binding rows in service order.
    pub fn rows(&self) -> &[BindingRow] {
        &self.results.bindings
    }

    /// Number of binding rows.
    pub fn len(&self) -> usize {
        self.results.bindings.len()
    }

    /// True when the service returned no rows.
    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}

impl BindingRow {
    /// Returns the bound value for `field`, or `""` when the variable is unbound.
    ///
    /// Rows with partial data are kept rather than dropped, so lookups never fail.
    pub fn value(&self, field: &str) -> &str {
        self.0
            .get(field)
            .map(|bound| bound.value.as_str())
            .unwrap_or("")
    }

    /// True when `field` is bound in this row.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BindingRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), BoundValue { value: v.into() }))
                .collect(),
        )
    }
}

impl From<Vec<BindingRow>> for SparqlResults {
    fn from(bindings: Vec<BindingRow>) -> Self {
        Self {
            results: ResultBindings { bindings },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wikidata_response_shape() {
        let body = r#"{
            "head": { "vars": ["person", "personLabel", "imageurl"] },
            "results": { "bindings": [
                {
                    "person": { "type": "uri", "value": "http://www.wikidata.org/entity/Q42" },
                    "personLabel": { "xml:lang": "en", "type": "literal", "value": "Douglas Adams" }
                }
            ] }
        }"#;
        let parsed = SparqlResults::from_json(body).expect("parse");
        assert_eq!(parsed.len(), 1);
        let row = &parsed.rows()[0];
        assert_eq!(row.value("personLabel"), "Douglas Adams");
        assert!(!row.contains("imageurl"));
        assert_eq!(row.value("imageurl"), "");
    }

    #[test]
    fn rejects_documents_without_results() {
        assert!(SparqlResults::from_json(r#"{"head": {}}"#).is_err());
        assert!(SparqlResults::from_json("<html>busy</html>").is_err());
    }
}
