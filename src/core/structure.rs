//! Immutable production structure (recipe-derived schema).
//!
//! Loaded once per session and never mutated afterwards. Construction
//! validates that field ids and cell triples are unique across the whole
//! structure and precomputes the totals the progress calculator needs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::CoreError;
use super::identity::{CellKey, ColumnId, FieldId, RowId, TableId};

/// Declared value kind of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
}

/// Fields grouped under a subtitle within a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub subtitle: String,
    pub fields: Vec<FieldDef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub id: TableId,
    pub title: String,
    pub rows: Vec<RowId>,
    pub columns: Vec<ColumnId>,
}

impl TableDef {
    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    pub fn contains_cell(&self, key: &CellKey) -> bool {
        key.table == self.id && self.rows.contains(&key.row) && self.columns.contains(&key.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub groups: Vec<FieldGroup>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
}

/// Validated, immutable structure of one production.
///
/// Private fields: the only way to obtain one is [`Structure::new`], which
/// enforces id uniqueness, so lookups can trust the indexes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStructure", into = "RawStructure")]
pub struct Structure {
    sections: Vec<Section>,
    field_index: BTreeSet<FieldId>,
    table_index: BTreeSet<TableId>,
    total_cells: usize,
}

/// Serde surface: sections only; indexes are rebuilt on deserialize so a
/// hand-written snapshot cannot bypass validation.
#[derive(Serialize, Deserialize)]
struct RawStructure {
    sections: Vec<Section>,
}

impl TryFrom<RawStructure> for Structure {
    type Error = CoreError;

    fn try_from(raw: RawStructure) -> Result<Self, CoreError> {
        Structure::new(raw.sections)
    }
}

impl From<Structure> for RawStructure {
    fn from(structure: Structure) -> Self {
        RawStructure {
            sections: structure.sections,
        }
    }
}

impl Structure {
    pub fn new(sections: Vec<Section>) -> Result<Self, CoreError> {
        let mut field_index = BTreeSet::new();
        let mut table_index = BTreeSet::new();
        let mut total_cells = 0usize;

        for section in &sections {
            for field in section_fields(section) {
                if !field_index.insert(field.id.clone()) {
                    return Err(CoreError::DuplicateId {
                        id: field.id.to_string(),
                    });
                }
            }
            for table in &section.tables {
                if !table_index.insert(table.id.clone()) {
                    return Err(CoreError::DuplicateId {
                        id: table.id.to_string(),
                    });
                }
                let mut rows = BTreeSet::new();
                for row in &table.rows {
                    if !rows.insert(row.clone()) {
                        return Err(CoreError::DuplicateId {
                            id: format!("{}/{}", table.id, row),
                        });
                    }
                }
                let mut columns = BTreeSet::new();
                for column in &table.columns {
                    if !columns.insert(column.clone()) {
                        return Err(CoreError::DuplicateId {
                            id: format!("{}/{}", table.id, column),
                        });
                    }
                }
                total_cells += table.cell_count();
            }
        }

        Ok(Self {
            sections,
            field_index,
            table_index,
            total_cells,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn contains_field(&self, id: &FieldId) -> bool {
        self.field_index.contains(id)
    }

    pub fn contains_cell(&self, key: &CellKey) -> bool {
        self.table_index.contains(&key.table)
            && self
                .sections
                .iter()
                .flat_map(|s| &s.tables)
                .any(|t| t.contains_cell(key))
    }

    pub fn total_fields(&self) -> usize {
        self.field_index.len()
    }

    pub fn total_cells(&self) -> usize {
        self.total_cells
    }

    /// All answerable elements (fields + cells).
    pub fn total_elements(&self) -> usize {
        self.total_fields() + self.total_cells()
    }
}

/// Simple fields followed by grouped fields, in declaration order.
pub(crate) fn section_fields(section: &Section) -> impl Iterator<Item = &FieldDef> {
    section
        .fields
        .iter()
        .chain(section.groups.iter().flat_map(|g| g.fields.iter()))
}
