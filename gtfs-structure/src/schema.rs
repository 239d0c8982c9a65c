//! Static field tables.
//!
//! Every entity type declares once, in a `static` slice of [FieldDef], the columns it knows
//! about. Loading, writing, validation and reference rewriting are all driven by that table.
use crate::entity::{KeyMap, Record};
use crate::error::{EntityError, ErrorKind};
use crate::values::FieldValue;
use crate::Error;
use rusqlite::types::Value;
pub use rusqlite::types::ValueRef;

/// Object safe view over a field value, whatever its concrete type
pub trait FieldView {
    /// Tabular text
    fn text(&self) -> String;
    /// Relational value
    fn sql(&self) -> Value;
    /// Numeric view for range and enum checks
    fn number(&self) -> Option<f64>;
    /// Is the value filled in
    fn present(&self) -> bool;
}

impl<T: FieldValue> FieldView for T {
    fn text(&self) -> String {
        self.to_text()
    }
    fn sql(&self) -> Value {
        self.to_sql()
    }
    fn number(&self) -> Option<f64> {
        self.as_number()
    }
    fn present(&self) -> bool {
        self.is_present()
    }
}

/// Describes one column of an entity type
pub struct FieldDef<E> {
    /// Column name in the feed
    pub name: &'static str,
    /// The column must exist and the value must be present
    pub required: bool,
    /// Inclusive numeric bounds
    pub range: Option<(f64, f64)>,
    /// Allowed values, empty when anything goes
    pub allowed: &'static [i64],
    /// Collection the value refers to
    pub target: Option<&'static str>,
    /// Read access
    pub get: fn(&E) -> &dyn FieldView,
    /// Parses the text into the field
    pub set_text: fn(&mut E, &str) -> Result<(), String>,
    /// Reads a relational value into the field
    pub set_sql: fn(&mut E, ValueRef<'_>) -> Result<(), String>,
}

impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FieldDef<E> {}

impl<E> std::fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("target", &self.target)
            .finish()
    }
}

impl<E> FieldDef<E> {
    /// An optional column without constraints. Use the [field!] macro instead.
    pub const fn new(
        name: &'static str,
        get: fn(&E) -> &dyn FieldView,
        set_text: fn(&mut E, &str) -> Result<(), String>,
        set_sql: fn(&mut E, ValueRef<'_>) -> Result<(), String>,
    ) -> Self {
        FieldDef {
            name,
            required: false,
            range: None,
            allowed: &[],
            target: None,
            get,
            set_text,
            set_sql,
        }
    }

    /// The column must be in the header and every row must fill it in
    pub const fn required(self) -> Self {
        FieldDef {
            required: true,
            ..self
        }
    }

    /// Numeric values must lie between `min` and `max`, both included
    pub const fn range(self, min: f64, max: f64) -> Self {
        FieldDef {
            range: Some((min, max)),
            ..self
        }
    }

    /// Numeric values must be one of `allowed`
    pub const fn allowed(self, allowed: &'static [i64]) -> Self {
        FieldDef { allowed, ..self }
    }

    /// The value is the identifier of an entity of the `target` collection
    pub const fn references(self, target: &'static str) -> Self {
        FieldDef {
            target: Some(target),
            ..self
        }
    }
}

/// Builds a [FieldDef] for the struct field `$field` of `$entity`, stored in column `$name`
#[macro_export]
macro_rules! field {
    ($entity:ty, $name:literal, $field:ident) => {{
        fn get(e: &$entity) -> &dyn $crate::schema::FieldView {
            &e.$field
        }
        fn set_text(e: &mut $entity, s: &str) -> Result<(), String> {
            e.$field = $crate::values::FieldValue::parse_text(s)?;
            Ok(())
        }
        fn set_sql(e: &mut $entity, v: $crate::schema::ValueRef<'_>) -> Result<(), String> {
            e.$field = $crate::values::FieldValue::from_sql(v)?;
            Ok(())
        }
        $crate::schema::FieldDef::new($name, get, set_text, set_sql)
    }};
}

/// Where each column of a file goes
#[derive(Debug, Clone)]
pub struct ColumnMap {
    /// For each column of the file: index in the field table, or `None` for unknown columns
    pub columns: Vec<Option<usize>>,
    /// Header of the file, as read
    pub headers: Vec<String>,
}

impl ColumnMap {
    /// Matches the headers of `file_name` against the field names.
    ///
    /// Duplicate columns and missing required columns are fatal.
    pub fn new<S: AsRef<str>>(
        file_name: &str,
        fields: &[(&'static str, bool)],
        headers: &[S],
    ) -> Result<Self, Error> {
        let mut columns = Vec::with_capacity(headers.len());
        let mut seen: Vec<&str> = Vec::with_capacity(headers.len());
        for header in headers {
            let header = header.as_ref();
            if seen.contains(&header) {
                return Err(Error::DuplicateColumn {
                    file_name: file_name.to_owned(),
                    column: header.to_owned(),
                });
            }
            seen.push(header);
            columns.push(fields.iter().position(|(name, _)| *name == header));
        }
        if let Some((name, _)) = fields
            .iter()
            .find(|(name, required)| *required && !seen.contains(name))
        {
            return Err(Error::MissingColumn {
                file_name: file_name.to_owned(),
                column: (*name).to_owned(),
            });
        }
        Ok(Self {
            columns,
            headers: headers.iter().map(|h| h.as_ref().to_owned()).collect(),
        })
    }
}

/// Builds an entity from the text values of one row.
///
/// Conversion problems do not fail: they are kept in the entity metadata and reported by
/// [validate].
pub fn load<'a, E: Record>(
    columns: &ColumnMap,
    values: impl IntoIterator<Item = &'a str>,
    line: Option<u64>,
) -> E {
    let fields = E::fields();
    let mut entity = E::default();
    let mut errors = Vec::new();
    let mut extra = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        let value = value.trim();
        match columns.columns.get(i) {
            Some(Some(f)) => {
                let def = &fields[*f];
                if value.is_empty() {
                    // types without an absent state keep their default, flag it here
                    if def.required && (def.get)(&entity).present() {
                        errors.push(EntityError::required(def.name));
                    }
                } else if let Err(e) = (def.set_text)(&mut entity, value) {
                    errors.push(EntityError::invalid_field(def.name, value, e));
                }
            }
            Some(None) => extra.push((columns.headers[i].clone(), value.to_owned())),
            None => errors.push(EntityError::row(format!(
                "row has more values than the {} columns of the header",
                columns.headers.len()
            ))),
        }
    }
    let meta = entity.meta_mut();
    meta.line = line;
    meta.extra = extra;
    meta.load_errors = errors
        .into_iter()
        .map(|e| e.at_line(line))
        .collect::<Vec<_>>();
    entity
}

/// Builds an entity from named relational values
pub fn load_sql<E: Record>(values: &[(&str, ValueRef<'_>)]) -> E {
    let fields = E::fields();
    let mut entity = E::default();
    let mut errors = Vec::new();
    for (name, value) in values {
        if let Some(def) = fields.iter().find(|f| f.name == *name) {
            if let Err(e) = (def.set_sql)(&mut entity, *value) {
                errors.push(EntityError::on_field(ErrorKind::Field, def.name, e));
            }
        }
    }
    entity.meta_mut().load_errors = errors;
    entity
}

/// Generic checks: conversion problems, required, range and enum, then the entity specific ones
pub fn validate<E: Record>(entity: &E) -> Vec<EntityError> {
    let mut errors = entity.meta().load_errors.clone();
    for def in E::fields() {
        if errors.iter().any(|e| e.field.as_deref() == Some(def.name)) {
            continue;
        }
        let value = (def.get)(entity);
        if !value.present() {
            if def.required {
                errors.push(EntityError::required(def.name));
            }
            continue;
        }
        let number = value.number();
        if let (Some((min, max)), Some(n)) = (def.range, number) {
            if n < min || n > max {
                errors.push(EntityError::range(def.name, &value.text(), min, max));
            }
        }
        if !def.allowed.is_empty() {
            if let Some(n) = number {
                if n.fract() != 0.0 || !def.allowed.contains(&(n as i64)) {
                    errors.push(EntityError::enumeration(
                        def.name,
                        &value.text(),
                        def.allowed,
                    ));
                }
            }
        }
    }
    entity.check(&mut errors);
    let line = entity.meta().line;
    errors.into_iter().map(|e| e.at_line(line)).collect()
}

/// Translates every reference field through `map`.
///
/// All the new values are resolved before any field is written: on error the entity is
/// left untouched.
pub fn update_keys<E: Record>(entity: &mut E, map: &dyn KeyMap) -> Result<(), EntityError> {
    let mut resolved = Vec::new();
    for def in E::fields() {
        let Some(target) = def.target else {
            continue;
        };
        let value = (def.get)(entity);
        if !value.present() {
            continue;
        }
        let old = value.text();
        match map.get(target, &old) {
            Some(new) => resolved.push((def, new.to_owned())),
            None => {
                return Err(
                    EntityError::reference(def.name, &old, target).at_line(entity.meta().line)
                )
            }
        }
    }
    for (def, new) in resolved {
        (def.set_text)(entity, &new)
            .map_err(|e| EntityError::invalid_field(def.name, &new, e))?;
    }
    Ok(())
}

/// Text of every field, in table order
pub fn text_row<E: Record>(entity: &E) -> Vec<String> {
    E::fields().iter().map(|f| (f.get)(entity).text()).collect()
}

/// Relational value of every field, in table order
pub fn sql_row<E: Record>(entity: &E) -> Vec<Value> {
    E::fields().iter().map(|f| (f.get)(entity).sql()).collect()
}
