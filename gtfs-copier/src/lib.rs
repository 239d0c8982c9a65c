/*! Copies a GTFS feed from a source to a destination, transforming it on the way.

A [Copier] reads each collection from a [Reader](adapters::Reader), runs every entity through the
registered [Filter](filters::Filter) stages, rewrites its references with the identifiers the
destination assigned to what was already copied, and hands it to a [Writer](adapters::Writer).
The correspondence between source and destination identifiers is kept in an [EntityMap].

```no_run
use gtfs_copier::{adapters::AdapterRegistry, filters::PrefixFilter, Copier, CopierOptions};

# async fn run() -> Result<(), gtfs_structures::Error> {
let registry = AdapterRegistry::with_defaults();
let reader = registry.open_reader("feed.zip")?;
let mut writer = registry.open_writer("out.db")?;
let mut copier = Copier::new(reader.as_ref(), writer.as_mut(), CopierOptions::default());
copier.add_filter(Box::new(PrefixFilter::new().with_prefix("stops.txt", "feedA-")));
let result = copier.copy().await?;
println!("{} errors", result.error_count());
# Ok(())
# }
```
*/
pub mod adapters;
pub mod copier;
pub mod entity_map;
pub mod filters;


pub use copier::{CollectionReport, Copier, CopierOptions, CopyResult, CopyStatus};
pub use entity_map::EntityMap;
