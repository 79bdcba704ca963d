//! All-or-nothing acceptance per identifier and the run's append-only result set.

use crate::extract::Record;

/// Minimum number of documented people a given name needs before it is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptanceGate {
    min_results: usize,
}

impl AcceptanceGate {
    /// Gate requiring at least `min_results` records.
    pub fn new(min_results: usize) -> Self {
        Self { min_results }
    }

    /// Configured threshold.
    pub fn min_results(&self) -> usize {
        self.min_results
    }

    /// True when the identifier's records should all be kept.
    pub fn accept(&self, records: &[Record]) -> bool {
        records.len() >= self.min_results
    }
}

impl Default for AcceptanceGate {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Records accepted during one run, in encounter order. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `records` when `gate` accepts them, returning whether it did.
    pub fn offer(&mut self, gate: &AcceptanceGate, records: Vec<Record>) -> bool {
        if !gate.accept(&records) {
            return false;
        }
        self.records.extend(records);
        true
    }

    /// Accepted records.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of accepted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was accepted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(namekey: &str, person: &str) -> Record {
        Record {
            namekey: namekey.into(),
            imageurl: String::new(),
            person: person.into(),
            person_label: String::new(),
            person_description: String::new(),
            wikipedia_en_url: String::new(),
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let gate = AcceptanceGate::new(2);
        assert!(!gate.accept(&[record("k", "a")]));
        assert!(gate.accept(&[record("k", "a"), record("k", "b")]));
        assert!(AcceptanceGate::new(0).accept(&[]));
    }

    #[test]
    fn offers_are_all_or_nothing() {
        let gate = AcceptanceGate::default();
        let mut set = ResultSet::new();
        assert!(!set.offer(&gate, vec![record("k1", "a")]));
        assert!(set.is_empty());
        assert!(set.offer(&gate, vec![record("k2", "a"), record("k2", "b")]));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn duplicates_across_identifiers_are_kept_in_order() {
        let gate = AcceptanceGate::default();
        let mut set = ResultSet::new();
        set.offer(&gate, vec![record("k1", "p"), record("k1", "q")]);
        set.offer(&gate, vec![record("k2", "p"), record("k2", "q")]);
        let keys: Vec<_> = set
            .records()
            .iter()
            .map(|r| (r.namekey.as_str(), r.person.as_str()))
            .collect();
        assert_eq!(keys, vec![("k1", "p"), ("k1", "q"), ("k2", "p"), ("k2", "q")]);
    }
}
