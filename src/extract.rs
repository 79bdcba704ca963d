//! Flattening SPARQL binding rows into output records.
//!
//! Extraction is fail-open: an unbound variable becomes an empty string and
//! the row is kept. Rows stay in the order the service returned them.

use crate::sparql::SparqlResults;
use crate::table::TableRow;

/// Prefix Wikidata uses for entity URIs.
pub const WIKIDATA_ENTITY_PREFIX: &str = "http://www.wikidata.org/entity/";

/// A documented person sharing a given name, with portrait and English article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Given-name entity URI the record was found under.
    pub namekey: String,
    /// Commons image URL.
    pub imageurl: String,
    /// Person entity URI.
    pub person: String,
    /// Person label.
    pub person_label: String,
    /// Short person description.
    pub person_description: String,
    /// English Wikipedia article URL.
    pub wikipedia_en_url: String,
}

impl TableRow for Record {
    const HEADER: &'static [&'static str] = &[
        "namekey",
        "imageurl",
        "person",
        "personLabel",
        "personDescription",
        "wikipediaENurl",
    ];

    fn fields(&self) -> Vec<&str> {
        vec![
            self.namekey.as_str(),
            self.imageurl.as_str(),
            self.person.as_str(),
            self.person_label.as_str(),
            self.person_description.as_str(),
            self.wikipedia_en_url.as_str(),
        ]
    }
}

/// A given name discovered by the seed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedName {
    /// Display label of the given name.
    pub label: String,
    /// Identifier exactly as the service returned it.
    pub qid: String,
}

impl TableRow for SeedName {
    const HEADER: &'static [&'static str] = &["givennameLabel", "qid"];

    fn fields(&self) -> Vec<&str> {
        vec![self.label.as_str(), self.qid.as_str()]
    }
}

/// Entity URI for a bare id such as `Q123`.
pub fn entity_uri(qid: &str) -> String {
    format!("{WIKIDATA_ENTITY_PREFIX}{qid}")
}

/// Accepts `Q123` or `http://www.wikidata.org/entity/Q123` and returns the bare id.
pub fn bare_qid(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let qid = raw.strip_prefix(WIKIDATA_ENTITY_PREFIX).unwrap_or(raw);
    let digits = qid.strip_prefix('Q')?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(qid)
}

/// Builds one [`Record`] per binding row, all keyed to `qid`.
pub fn extract_records(qid: &str, results: &SparqlResults) -> Vec<Record> {
    let namekey = entity_uri(qid);
    results
        .rows()
        .iter()
        .map(|row| Record {
            namekey: namekey.clone(),
            imageurl: row.value("imageurl").to_string(),
            person: row.value("person").to_string(),
            person_label: row.value("personLabel").to_string(),
            person_description: row.value("personDescription").to_string(),
            wikipedia_en_url: row.value("wikipediaENurl").to_string(),
        })
        .collect()
}

/// Builds one [`SeedName`] per binding row.
pub fn extract_seed_names(results: &SparqlResults) -> Vec<SeedName> {
    results
        .rows()
        .iter()
        .map(|row| SeedName {
            label: row.value("givennameLabel").to_string(),
            qid: row.value("qid").to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::BindingRow;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_become_empty_strings() {
        let results = SparqlResults::from(vec![
            [
                ("person", "http://www.wikidata.org/entity/Q1"),
                ("personLabel", "Ada"),
                ("wikipediaENurl", "https://en.wikipedia.org/wiki/Ada"),
            ]
            .into_iter()
            .collect::<BindingRow>(),
            BindingRow::default(),
        ]);

        let records = extract_records("Q7", &results);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            Record {
                namekey: "http://www.wikidata.org/entity/Q7".into(),
                imageurl: String::new(),
                person: "http://www.wikidata.org/entity/Q1".into(),
                person_label: "Ada".into(),
                person_description: String::new(),
                wikipedia_en_url: "https://en.wikipedia.org/wiki/Ada".into(),
            }
        );
        assert_eq!(records[1].person, "");
        assert_eq!(records[1].namekey, "http://www.wikidata.org/entity/Q7");
    }

    #[test]
    fn normalizes_entity_identifiers() {
        assert_eq!(bare_qid("Q123"), Some("Q123"));
        assert_eq!(bare_qid(" http://www.wikidata.org/entity/Q42 "), Some("Q42"));
        assert_eq!(bare_qid("Q"), None);
        assert_eq!(bare_qid("P735"), None);
        assert_eq!(bare_qid("Q1 . }"), None);
    }

    #[test]
    fn keeps_service_order() {
        let results = SparqlResults::from(
            ["Zoe", "Adam", "Mia"]
                .iter()
                .map(|label| [("givennameLabel", *label), ("qid", "Q1")].into_iter().collect())
                .collect::<Vec<BindingRow>>(),
        );
        let labels: Vec<_> = extract_seed_names(&results)
            .into_iter()
            .map(|seed| seed.label)
            .collect();
        assert_eq!(labels, vec!["Zoe", "Adam", "Mia"]);
    }
}
