//! Derived completion metrics.
//!
//! Pure function of (structure totals, answer store). Runs after every
//! accepted mutation, so it iterates only stored answers, never the full
//! structure.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::answers::AnswerStore;
use super::structure::Structure;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub answered_fields: usize,
    pub answered_cells: usize,
    /// Distinct answered elements (fields + cells).
    pub answered: usize,
    /// Answerable elements declared by the structure.
    pub total: usize,
    /// 0.0 when the structure declares no elements.
    pub percent: f64,
}

/// Count answered elements and derive the completion percentage.
///
/// The store is keyed per id so duplicates cannot occur by construction,
/// but counting goes through distinct-key sets anyway so a racy or
/// corrupted snapshot can never inflate the percentage.
pub fn progress(structure: &Structure, answers: &AnswerStore) -> Progress {
    let answered_field_ids: BTreeSet<_> = answers
        .fields()
        .iter()
        .filter(|(_, slot)| slot.value.is_answered())
        .map(|(id, _)| id)
        .collect();
    let answered_cell_keys: BTreeSet<_> = answers
        .cells()
        .iter()
        .filter(|(_, slot)| slot.value.is_answered())
        .map(|(key, _)| key)
        .collect();

    let answered_fields = answered_field_ids.len();
    let answered_cells = answered_cell_keys.len();
    let answered = answered_fields + answered_cells;
    let total = structure.total_elements();
    let percent = if total == 0 {
        0.0
    } else {
        answered as f64 / total as f64 * 100.0
    };

    Progress {
        answered_fields,
        answered_cells,
        answered,
        total,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crdt::Lww;
    use crate::core::identity::{ActorId, EditKey, FieldId};
    use crate::core::structure::fixtures::{cell, sample_structure};
    use crate::core::time::{Stamp, WriteStamp};
    use crate::core::value::AnswerValue;

    fn slot(value: AnswerValue) -> Lww<AnswerValue> {
        Lww::new(
            value,
            Stamp::new(WriteStamp::new(10, 0), ActorId::new("ana").unwrap()),
        )
    }

    fn fkey(id: &str) -> EditKey {
        EditKey::Field(FieldId::new(id).unwrap())
    }

    #[test]
    fn counts_non_blank_answers_only() {
        // 4 fields + 2 cells declared; 2 field answers + 1 cell answer.
        let structure = sample_structure();
        let mut store = AnswerStore::new();
        store
            .set(&structure, &fkey("f1"), slot(AnswerValue::Number(7.5)))
            .unwrap();
        store
            .set(&structure, &fkey("f2"), slot(AnswerValue::Text("acme".into())))
            .unwrap();
        // Blank answer does not count.
        store
            .set(&structure, &fkey("f3"), slot(AnswerValue::Text("  ".into())))
            .unwrap();
        store
            .set(
                &structure,
                &EditKey::Cell(cell("t1", "r1", "c1")),
                slot(AnswerValue::Number(120.0)),
            )
            .unwrap();

        let p = progress(&structure, &store);
        assert_eq!(p.answered_fields, 2);
        assert_eq!(p.answered_cells, 1);
        assert_eq!(p.answered, 3);
        assert_eq!(p.total, 6);
        assert_eq!(p.percent, 50.0);
    }

    #[test]
    fn empty_structure_yields_zero_percent() {
        let structure = Structure::new(vec![]).unwrap();
        let store = AnswerStore::new();
        let p = progress(&structure, &store);
        assert_eq!(p.answered, 0);
        assert_eq!(p.total, 0);
        assert_eq!(p.percent, 0.0);
    }

    #[test]
    fn nulling_an_answer_uncounts_it() {
        let structure = sample_structure();
        let mut store = AnswerStore::new();
        store
            .set(&structure, &fkey("f1"), slot(AnswerValue::Text("x".into())))
            .unwrap();
        assert_eq!(progress(&structure, &store).answered, 1);

        let mut cleared = slot(AnswerValue::Null);
        cleared.stamp.at = WriteStamp::new(20, 0);
        store.set(&structure, &fkey("f1"), cleared).unwrap();
        assert_eq!(progress(&structure, &store).answered, 0);
    }
}
