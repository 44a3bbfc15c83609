//! Structural location lookup for display/error context.

use serde::{Deserialize, Serialize};

use super::identity::{FieldId, TableId};
use super::structure::{Section, Structure};

/// What to look up: a field (simple or grouped) or a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemRef {
    Field(FieldId),
    Table(TableId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Field,
    GroupField,
    Table,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLocation {
    pub section_title: String,
    pub item_title: String,
    pub kind: ItemKind,
    /// Set only for fields that live inside a group.
    pub group_title: Option<String>,
}

/// First structural match for the given id, scanning sections in order.
pub fn locate(structure: &Structure, item: &ItemRef) -> Option<ItemLocation> {
    structure
        .sections()
        .iter()
        .find_map(|section| locate_in_section(section, item))
}

fn locate_in_section(section: &Section, item: &ItemRef) -> Option<ItemLocation> {
    match item {
        ItemRef::Field(id) => {
            if let Some(field) = section.fields.iter().find(|f| &f.id == id) {
                return Some(ItemLocation {
                    section_title: section.title.clone(),
                    item_title: field.name.clone(),
                    kind: ItemKind::Field,
                    group_title: None,
                });
            }
            for group in &section.groups {
                if let Some(field) = group.fields.iter().find(|f| &f.id == id) {
                    return Some(ItemLocation {
                        section_title: section.title.clone(),
                        item_title: field.name.clone(),
                        kind: ItemKind::GroupField,
                        group_title: Some(group.subtitle.clone()),
                    });
                }
            }
            None
        }
        ItemRef::Table(id) => section.tables.iter().find(|t| &t.id == id).map(|table| {
            ItemLocation {
                section_title: section.title.clone(),
                item_title: table.title.clone(),
                kind: ItemKind::Table,
                group_title: None,
            }
        }),
    }
}
