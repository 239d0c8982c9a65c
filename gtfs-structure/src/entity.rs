//! What every record type can do, and the closed union of all of them
use crate::error::EntityError;
use crate::objects::*;
use crate::schema::{self, ColumnMap, FieldDef, ValueRef};
use rusqlite::types::Value;
use std::fmt;

/// Read access to the identifier correspondence table, as needed to rewrite references
pub trait KeyMap {
    /// New identifier of the `old_id` entity of `collection`, if it was copied
    fn get(&self, collection: &str, old_id: &str) -> Option<&str>;
}

/// Bookkeeping attached to each entity, never written out as a column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    /// Line in the source file
    pub line: Option<u64>,
    /// Columns unknown to the schema, in file order, kept to write them back
    pub extra: Vec<(String, String)>,
    /// Conversion problems met while loading
    pub load_errors: Vec<EntityError>,
}

/// The capabilities of a record type
pub trait Record: Default + Clone + fmt::Debug + Send + 'static {
    /// File (and namespace in the identifier map) of the type
    const COLLECTION: &'static str;

    /// Column holding the natural key, for types that have one
    const ID_COLUMN: Option<&'static str> = None;

    /// Static field table
    fn fields() -> &'static [FieldDef<Self>];

    /// Natural key, empty for types without an identity
    fn entity_id(&self) -> &str {
        ""
    }

    /// Replaces the natural key. Does nothing for types without an identity
    fn set_entity_id(&mut self, _id: String) {}

    /// Line, extra columns and load errors of the entity
    fn meta(&self) -> &Meta;

    /// Mutable access to [Record::meta]
    fn meta_mut(&mut self) -> &mut Meta;

    /// Checks that do not fit in the field table
    fn check(&self, _errors: &mut Vec<EntityError>) {}

    /// Advisory conditions
    fn check_warnings(&self, _warnings: &mut Vec<EntityError>) {}

    /// Rewrites every reference field, atomically
    fn update_keys(&mut self, map: &dyn KeyMap) -> Result<(), EntityError> {
        schema::update_keys(self, map)
    }

    /// Everything that should keep this entity out of a destination
    fn errors(&self) -> Vec<EntityError> {
        schema::validate(self)
    }

    /// Conditions reported without keeping the entity out, with its source line
    fn warnings(&self) -> Vec<EntityError> {
        let mut warnings = Vec::new();
        self.check_warnings(&mut warnings);
        let line = self.meta().line;
        warnings.into_iter().map(|w| w.at_line(line)).collect()
    }
}

macro_rules! entities {
    ($($variant:ident),* $(,)?) => {
        /// Kind of entity, listed in the order a copy processes them
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EntityKind {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        impl EntityKind {
            /// Every kind, parents before the collections referring to them
            pub const ALL: &'static [EntityKind] = &[$(EntityKind::$variant),*];

            /// File name of the collection
            pub fn collection(self) -> &'static str {
                match self {
                    $(EntityKind::$variant => <$variant as Record>::COLLECTION,)*
                }
            }

            /// Kind stored in the given file
            pub fn from_collection(collection: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|k| k.collection() == collection)
            }

            /// Column holding the natural key
            pub fn id_column(self) -> Option<&'static str> {
                match self {
                    $(EntityKind::$variant => <$variant as Record>::ID_COLUMN,)*
                }
            }

            /// Column names, in table order
            pub fn columns(self) -> Vec<&'static str> {
                match self {
                    $(EntityKind::$variant => <$variant as Record>::fields().iter().map(|f| f.name).collect(),)*
                }
            }

            /// Column names with their required flag
            pub fn column_specs(self) -> Vec<(&'static str, bool)> {
                match self {
                    $(EntityKind::$variant => <$variant as Record>::fields().iter().map(|f| (f.name, f.required)).collect(),)*
                }
            }

            /// (column, target collection) of every reference field
            pub fn references(self) -> Vec<(&'static str, &'static str)> {
                match self {
                    $(EntityKind::$variant => <$variant as Record>::fields()
                        .iter()
                        .filter_map(|f| f.target.map(|t| (f.name, t)))
                        .collect(),)*
                }
            }

            /// Builds an entity from the text values of a row
            pub fn load_row<'a>(
                self,
                columns: &ColumnMap,
                values: impl IntoIterator<Item = &'a str>,
                line: Option<u64>,
            ) -> Entity {
                match self {
                    $(EntityKind::$variant => Entity::$variant(schema::load::<$variant>(columns, values, line)),)*
                }
            }

            /// Builds an entity from named relational values
            pub fn load_sql(self, values: &[(&str, ValueRef<'_>)]) -> Entity {
                match self {
                    $(EntityKind::$variant => Entity::$variant(schema::load_sql::<$variant>(values)),)*
                }
            }
        }

        impl fmt::Display for EntityKind {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.collection())
            }
        }

        /// Any entity. Stages match on the variants they care about and let the others through
        #[derive(Debug, Clone)]
        pub enum Entity {
            $(
                #[allow(missing_docs)]
                $variant($variant),
            )*
        }

        $(
            impl From<$variant> for Entity {
                fn from(e: $variant) -> Self {
                    Entity::$variant(e)
                }
            }
        )*

        impl Entity {
            /// Kind of the wrapped record
            pub fn kind(&self) -> EntityKind {
                match self {
                    $(Entity::$variant(_) => EntityKind::$variant,)*
                }
            }

            /// Natural key of the wrapped record, empty for types without an identity
            pub fn entity_id(&self) -> &str {
                match self {
                    $(Entity::$variant(e) => e.entity_id(),)*
                }
            }

            /// Replaces the natural key, see [Record::set_entity_id]
            pub fn set_entity_id(&mut self, id: String) {
                match self {
                    $(Entity::$variant(e) => e.set_entity_id(id),)*
                }
            }

            /// Rewrites the reference fields through `map`. On error nothing was changed
            pub fn update_keys(&mut self, map: &dyn KeyMap) -> Result<(), EntityError> {
                match self {
                    $(Entity::$variant(e) => e.update_keys(map),)*
                }
            }

            /// See [Record::errors]
            pub fn errors(&self) -> Vec<EntityError> {
                match self {
                    $(Entity::$variant(e) => e.errors(),)*
                }
            }

            /// See [Record::warnings]
            pub fn warnings(&self) -> Vec<EntityError> {
                match self {
                    $(Entity::$variant(e) => e.warnings(),)*
                }
            }

            /// See [Record::meta]
            pub fn meta(&self) -> &Meta {
                match self {
                    $(Entity::$variant(e) => e.meta(),)*
                }
            }

            /// See [Record::meta_mut]
            pub fn meta_mut(&mut self) -> &mut Meta {
                match self {
                    $(Entity::$variant(e) => e.meta_mut(),)*
                }
            }

            /// Text of every column, in [EntityKind::columns] order
            pub fn text_row(&self) -> Vec<String> {
                match self {
                    $(Entity::$variant(e) => schema::text_row(e),)*
                }
            }

            /// Relational value of every column, in [EntityKind::columns] order
            pub fn sql_row(&self) -> Vec<Value> {
                match self {
                    $(Entity::$variant(e) => schema::sql_row(e),)*
                }
            }

            /// Text of one column, `None` if the type has no such column
            pub fn field_text(&self, column: &str) -> Option<String> {
                match self {
                    $(Entity::$variant(e) => <$variant as Record>::fields()
                        .iter()
                        .find(|f| f.name == column)
                        .map(|f| (f.get)(e).text()),)*
                }
            }
        }
    };
}

entities!(
    FeedInfo,
    Agency,
    Level,
    Stop,
    Shape,
    Calendar,
    CalendarDate,
    Network,
    Route,
    Trip,
    StopTime,
    Frequency,
    Transfer,
    Pathway,
    FareAttribute,
    FareRule,
);

impl Entity {
    /// File name of the entity's collection
    pub fn collection(&self) -> &'static str {
        self.kind().collection()
    }
}
