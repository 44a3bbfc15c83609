//! Identity atoms.
//!
//! Field/table/row/column ids come from the recipe structure; production
//! codes name an open production; actor ids identify the writing user
//! (email or account name, opaque to the engine).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId};

macro_rules! id_newtype {
    ($name:ident, $variant:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
                let s = s.into();
                if s.trim().is_empty() {
                    Err(InvalidId::$variant {
                        raw: s,
                        reason: "empty".into(),
                    }
                    .into())
                } else {
                    Ok(Self(s))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(FieldId, Field, "Simple or grouped field identifier, unique across a structure.");
id_newtype!(TableId, Table, "Table identifier, unique across a structure.");
id_newtype!(RowId, Row, "Row identifier within a table.");
id_newtype!(ColumnId, Column, "Column identifier within a table.");
id_newtype!(ProductionCode, Production, "Code naming one open production.");
id_newtype!(ActorId, Actor, "Writing user identity - non-empty, otherwise opaque.");

/// Cell address: (table, row, column), unique across a structure.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub table: TableId,
    pub row: RowId,
    pub column: ColumnId,
}

impl CellKey {
    pub fn new(table: TableId, row: RowId, column: ColumnId) -> Self {
        Self { table, row, column }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.table, self.row, self.column)
    }
}

/// Key of one editable slot: a simple/grouped field or a table cell.
///
/// The edit coordinator serializes persistence per key; the applier defers
/// inbound updates per key while a local edit is outstanding.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EditKey {
    Field(FieldId),
    Cell(CellKey),
}

impl fmt::Display for EditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKey::Field(id) => write!(f, "field {id}"),
            EditKey::Cell(key) => write!(f, "cell {key}"),
        }
    }
}
