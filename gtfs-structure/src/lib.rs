/*! The [General Transit Feed Specification](https://gtfs.org/) (GTFS) is a commonly used model to represent public transit data.

This crate holds the entity model used to copy and transform GTFS feeds: one struct per file,
a static field table per struct, and the validation rules of each entity type.

To get started, see [Entity] and [Record].

## What is GTFS

A Gtfs feed is a collection of CSV files (often bundled as a zip file).
Each file represents a collection of one type (stops, lines, etc.) that have relationships through unique identifiers.

## Design decisions

### Field tables

Each entity type lists its columns once, in a `static` slice of [FieldDef] built with the [field!] macro:
column name, whether it is required, numeric bounds, allowed values and, for references, the collection
it points to. Loading, writing, validation and the rewriting of references are all driven by that table.

### Optional values

Optional fields are [Opt], a thin wrapper over [std::option::Option] that knows how to go to and from
the CSV text, SQLite values and JSON. An empty CSV value is always absent, strings included.

### Integers instead of enums

Enumerated values (`location_type`, `route_type`…) are kept as integers checked against their allowed set,
so that a feed with an unexpected value can still be read, reported and, if asked, copied.

### Renaming

We kept some names even if they can be confusing (a [Calendar] will be referenced by `service_id`), but we strip the object type (`route_short_name` is [Route::short_name]).

*/
#![warn(missing_docs)]
// a test build fails on an undocumented public item
#![cfg_attr(test, deny(missing_docs))]

pub mod entity;
pub mod error;
pub(crate) mod objects;
pub mod opt;
pub mod schema;
pub mod validation;
pub mod values;


pub use entity::{Entity, EntityKind, KeyMap, Meta, Record};
pub use error::{EntityError, Error, ErrorKind};
pub use objects::*;
pub use opt::Opt;
pub use schema::{ColumnMap, FieldDef};
pub use values::{Color, FieldValue, Seconds};
