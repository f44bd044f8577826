//! Exact matching of free-form identifier strings against a class roster.
//!
//! Shared by import duplicate checks, attendance quick entry and mark-sheet
//! extraction reconciliation. Everything here is pure.

use std::collections::{BTreeSet, HashMap, HashSet};

/// One roster member as far as matching is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: i64,
    pub roll_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub matched_ids: BTreeSet<i64>,
    /// Input tokens with no roster match, in first-appearance order, original casing.
    pub unmatched_candidates: Vec<String>,
}

/// Trim, then uppercase. The only normalization applied before comparing.
pub fn normalize_identifier(s: &str) -> String {
    s.trim().to_uppercase()
}

fn roster_index(roster: &[RosterEntry]) -> HashMap<String, Vec<i64>> {
    let mut by_key: HashMap<String, Vec<i64>> = HashMap::new();
    for entry in roster {
        by_key
            .entry(normalize_identifier(&entry.roll_number))
            .or_default()
            .push(entry.id);
    }
    by_key
}

pub fn match_identifiers<I, S>(candidates: I, roster: &[RosterEntry]) -> ReconciliationResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let by_key = roster_index(roster);
    let mut seen = HashSet::<String>::new();
    let mut out = ReconciliationResult::default();

    for candidate in candidates {
        let raw = candidate.as_ref().trim();
        let key = normalize_identifier(raw);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        match by_key.get(&key) {
            Some(ids) => out.matched_ids.extend(ids.iter().copied()),
            None => out.unmatched_candidates.push(raw.to_string()),
        }
    }
    out
}

/// Splits a pasted roll list on commas and any whitespace.
pub fn split_roll_list(text: &str) -> Vec<&str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSplit {
    pub present: Vec<i64>,
    pub absent: Vec<i64>,
    pub unmatched: Vec<String>,
}

/// Everyone named in `text` is present; the rest of the roster is absent.
/// `present` and `absent` follow roster order.
pub fn quick_entry(text: &str, roster: &[RosterEntry]) -> AttendanceSplit {
    let result = match_identifiers(split_roll_list(text), roster);
    let (present, absent): (Vec<&RosterEntry>, Vec<&RosterEntry>) = roster
        .iter()
        .partition(|e| result.matched_ids.contains(&e.id));
    AttendanceSplit {
        present: present.into_iter().map(|e| e.id).collect(),
        absent: absent.into_iter().map(|e| e.id).collect(),
        unmatched: result.unmatched_candidates,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPair {
    pub identifier: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    pub student_id: i64,
    pub roll_number: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReconciliation {
    pub updates: Vec<ValueUpdate>,
    pub unmatched: Vec<String>,
    /// Roster members with no extracted value; they keep whatever they had.
    pub untouched: Vec<i64>,
}

/// Applies extracted values to matched roster members. When two pairs
/// normalize to the same identifier the last one wins.
pub fn reconcile_extracted(pairs: &[ExtractedPair], roster: &[RosterEntry]) -> ExtractionReconciliation {
    let result = match_identifiers(pairs.iter().map(|p| p.identifier.as_str()), roster);

    let mut value_by_key: HashMap<String, f64> = HashMap::new();
    for pair in pairs {
        value_by_key.insert(normalize_identifier(&pair.identifier), pair.value);
    }

    let mut out = ExtractionReconciliation {
        unmatched: result.unmatched_candidates,
        ..Default::default()
    };
    for entry in roster {
        let value = result
            .matched_ids
            .contains(&entry.id)
            .then(|| value_by_key.get(&normalize_identifier(&entry.roll_number)))
            .flatten();
        match value {
            Some(v) => out.updates.push(ValueUpdate {
                student_id: entry.id,
                roll_number: entry.roll_number.clone(),
                value: *v,
            }),
            None => out.untouched.push(entry.id),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(rolls: &[&str]) -> Vec<RosterEntry> {
        rolls
            .iter()
            .enumerate()
            .map(|(i, r)| RosterEntry {
                id: i as i64 + 1,
                roll_number: r.to_string(),
            })
            .collect()
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_identifier(" a1 "), normalize_identifier("A1"));
        assert_eq!(normalize_identifier("\tr-9x\n"), "R-9X");
    }

    #[test]
    fn substring_never_matches() {
        let r = roster(&["A1", "A10"]);
        let res = match_identifiers(["A", "1", "A100"], &r);
        assert!(res.matched_ids.is_empty());
        assert_eq!(res.unmatched_candidates, vec!["A", "1", "A100"]);
    }

    #[test]
    fn candidates_dedup_after_normalization_keeping_first_spelling() {
        let r = roster(&["A1"]);
        let res = match_identifiers(["zz9", " ZZ9", "a1", "A1 "], &r);
        assert_eq!(res.matched_ids, BTreeSet::from([1]));
        assert_eq!(res.unmatched_candidates, vec!["zz9"]);
    }

    #[test]
    fn blank_candidates_are_ignored() {
        let r = roster(&["A1"]);
        let res = match_identifiers(["", "   "], &r);
        assert!(res.matched_ids.is_empty());
        assert!(res.unmatched_candidates.is_empty());
    }

    #[test]
    fn quick_entry_marks_everyone_else_absent() {
        let r = roster(&["A1", "A2", "A3"]);
        let split = quick_entry("a1, a2", &r);
        assert_eq!(split.present, vec![1, 2]);
        assert_eq!(split.absent, vec![3]);
        assert!(split.unmatched.is_empty());
    }

    #[test]
    fn quick_entry_splits_on_newlines_and_runs_of_separators() {
        let r = roster(&["A1", "A2", "A3"]);
        let split = quick_entry("a3\n\n,,  x7\ta1", &r);
        assert_eq!(split.present, vec![1, 3]);
        assert_eq!(split.absent, vec![2]);
        assert_eq!(split.unmatched, vec!["x7"]);
    }

    #[test]
    fn extraction_reports_unknown_ids_and_updates_nothing() {
        let r = roster(&["A1", "A2"]);
        let rec = reconcile_extracted(
            &[ExtractedPair {
                identifier: "A9".into(),
                value: 20.0,
            }],
            &r,
        );
        assert!(rec.updates.is_empty());
        assert_eq!(rec.unmatched, vec!["A9"]);
        assert_eq!(rec.untouched, vec![1, 2]);
    }

    #[test]
    fn extraction_last_pair_wins_for_repeated_identifier() {
        let r = roster(&["A1", "A2"]);
        let rec = reconcile_extracted(
            &[
                ExtractedPair {
                    identifier: "a2".into(),
                    value: 11.5,
                },
                ExtractedPair {
                    identifier: "A2".into(),
                    value: 3.0,
                },
            ],
            &r,
        );
        assert_eq!(
            rec.updates,
            vec![ValueUpdate {
                student_id: 2,
                roll_number: "A2".into(),
                value: 3.0
            }]
        );
        assert_eq!(rec.untouched, vec![1]);
        assert!(rec.unmatched.is_empty());
    }

    #[test]
    fn repeated_unknown_identifiers_are_reported_once_in_first_order() {
        let r = roster(&["A1"]);
        let pairs: Vec<ExtractedPair> = [("x2", 1.0), ("B7", 2.0), ("X2", 3.0)]
            .iter()
            .map(|(id, v)| ExtractedPair {
                identifier: id.to_string(),
                value: *v,
            })
            .collect();
        let rec = reconcile_extracted(&pairs, &r);
        assert_eq!(rec.unmatched, vec!["x2", "B7"]);
        assert!(rec.updates.is_empty());
    }
}
