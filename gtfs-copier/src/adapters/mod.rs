//! Sources and destinations of a copy.
//!
//! A [Reader] hands out one lazy [EntityStream] per collection. Each stream is fed by a blocking
//! producer through a bounded channel, so a reader never holds a whole file in memory.
use gtfs_structures::{Entity, EntityError, EntityKind, Error};
use log::warn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod csv;
pub mod csv_writer;
pub mod memory;
pub mod sqlite;

pub use self::csv::CsvReader;
pub use csv_writer::CsvWriter;
pub use memory::{MemoryReader, MemoryWriter};
pub use sqlite::{SqliteReader, SqliteWriter};

/// One item of a stream: an entity, or a row that could not be read at all
pub type StreamItem = Result<Entity, EntityError>;

/// How streams are produced
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Capacity of the channel between the producer and the copier
    pub buffer_size: usize,
    /// Stops the producer before its next publish
    pub cancel: CancellationToken,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            cancel: CancellationToken::new(),
        }
    }
}

/// Producer side of an [EntityStream]
pub struct Publisher {
    tx: mpsc::Sender<StreamItem>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Blocks while the buffer is full.
    ///
    /// Returns false once the run is cancelled or the consumer went away: the producer must stop.
    pub fn publish(&self, item: StreamItem) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.blocking_send(item).is_ok()
    }
}

/// A finite, non restartable sequence of entities of one collection
pub struct EntityStream {
    rx: mpsc::Receiver<StreamItem>,
    handle: JoinHandle<Result<(), Error>>,
}

impl EntityStream {
    /// Runs `produce` on the blocking thread pool. Must be called within a tokio runtime
    pub fn spawn<F>(options: &StreamOptions, produce: F) -> Self
    where
        F: FnOnce(&Publisher) -> Result<(), Error> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(options.buffer_size.max(1));
        let publisher = Publisher {
            tx,
            cancel: options.cancel.clone(),
        };
        let handle = tokio::task::spawn_blocking(move || produce(&publisher));
        Self { rx, handle }
    }

    /// Streams the given entities
    pub fn from_entities(options: &StreamOptions, entities: Vec<Entity>) -> Self {
        Self::spawn(options, move |publisher| {
            for entity in entities {
                if !publisher.publish(Ok(entity)) {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Next item, `None` once the producer is done
    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Stops receiving and waits for the producer, surfacing its fatal error if any
    pub async fn finish(self) -> Result<(), Error> {
        let EntityStream { mut rx, handle } = self;
        rx.close();
        // unblock a producer waiting on a full buffer
        while rx.recv().await.is_some() {}
        handle.await.map_err(|e| {
            warn!("stream producer died: {}", e);
            Error::Task(e.to_string())
        })?
    }
}

/// Where entities come from
pub trait Reader: Send + Sync {
    /// Cheap checks done before any copy: required files and columns. Every problem found is returned
    fn validate_structure(&self) -> Vec<Error>;

    /// Stream of the collection, `None` when the source does not have it
    fn read(&self, kind: EntityKind, options: &StreamOptions) -> Result<Option<EntityStream>, Error>;

    /// Stop times of the given trips, in source order
    fn stop_times_by_trip_ids(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error>;

    /// Stop times of every trip but the given ones, in source order
    fn stop_times_of_other_trips(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error>;

    /// Releases the source
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Where entities go
pub trait Writer: Send {
    /// Provisions the destination
    fn create(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Removes the destination and everything in it
    fn delete(&mut self) -> Result<(), Error>;

    /// Persists one entity, whose references are already rewritten, and returns its new identifier
    fn add_entity(&mut self, entity: &Entity) -> Result<String, Error>;

    /// Persists several entities, returns their identifiers in the same order
    fn add_entities(&mut self, entities: &[Entity]) -> Result<Vec<String>, Error> {
        entities.iter().map(|e| self.add_entity(e)).collect()
    }

    /// Reader over what was written so far
    fn new_reader(&mut self) -> Result<Box<dyn Reader>, Error>;

    /// Flushes and releases the destination
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Opens a reader on a location
pub type ReaderFactory = fn(&str) -> Result<Box<dyn Reader>, Error>;
/// Opens a writer on a location
pub type WriterFactory = fn(&str) -> Result<Box<dyn Writer>, Error>;

/// Adapters by scheme (`csv`, `zip`, `sqlite`…).
///
/// Build one at startup and pass it to whatever needs to open a location.
#[derive(Default)]
pub struct AdapterRegistry {
    readers: Vec<(String, ReaderFactory)>,
    writers: Vec<(String, WriterFactory)>,
}

impl AdapterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapters of this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_reader("csv", |location| Ok(Box::new(CsvReader::open(location)?)));
        registry.register_reader("zip", |location| Ok(Box::new(CsvReader::open(location)?)));
        registry.register_reader("sqlite", |location| {
            Ok(Box::new(SqliteReader::open(location)?))
        });
        registry.register_writer("csv", |location| Ok(Box::new(CsvWriter::new(location))));
        registry.register_writer("sqlite", |location| {
            Ok(Box::new(SqliteWriter::open(location)?))
        });
        registry
    }

    /// Registers (or replaces) the reader of a scheme
    pub fn register_reader(&mut self, scheme: &str, factory: ReaderFactory) {
        self.readers.retain(|(s, _)| s != scheme);
        self.readers.push((scheme.to_owned(), factory));
    }

    /// Registers (or replaces) the writer of a scheme
    pub fn register_writer(&mut self, scheme: &str, factory: WriterFactory) {
        self.writers.retain(|(s, _)| s != scheme);
        self.writers.push((scheme.to_owned(), factory));
    }

    /// Scheme and path of a location: an explicit `scheme://` prefix wins, then the extension
    pub fn split_location(location: &str) -> (String, &str) {
        if let Some((scheme, path)) = location.split_once("://") {
            return (scheme.to_lowercase(), path);
        }
        let lower = location.to_lowercase();
        let scheme = if lower.ends_with(".zip") {
            "zip"
        } else if lower.ends_with(".db") || lower.ends_with(".sqlite") {
            "sqlite"
        } else {
            "csv"
        };
        (scheme.to_owned(), location)
    }

    pub fn open_reader(&self, location: &str) -> Result<Box<dyn Reader>, Error> {
        let (scheme, path) = Self::split_location(location);
        let factory = self
            .readers
            .iter()
            .find(|(s, _)| *s == scheme)
            .map(|(_, f)| f)
            .ok_or_else(|| Error::UnsupportedAdapter(location.to_owned()))?;
        factory(path)
    }

    pub fn open_writer(&self, location: &str) -> Result<Box<dyn Writer>, Error> {
        let (scheme, path) = Self::split_location(location);
        let factory = self
            .writers
            .iter()
            .find(|(s, _)| *s == scheme)
            .map(|(_, f)| f)
            .ok_or_else(|| Error::UnsupportedAdapter(location.to_owned()))?;
        factory(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes() {
        assert_eq!(
            ("zip".to_owned(), "feed.zip"),
            AdapterRegistry::split_location("feed.zip")
        );
        assert_eq!(
            ("sqlite".to_owned(), "/tmp/out.db"),
            AdapterRegistry::split_location("/tmp/out.db")
        );
        assert_eq!(
            ("sqlite".to_owned(), "out"),
            AdapterRegistry::split_location("sqlite://out")
        );
        assert_eq!(
            ("csv".to_owned(), "fixtures/basic"),
            AdapterRegistry::split_location("fixtures/basic")
        );
    }

    #[test]
    fn unknown_scheme() {
        let registry = AdapterRegistry::with_defaults();
        assert!(matches!(
            registry.open_writer("zip://out.zip"),
            Err(Error::UnsupportedAdapter(_))
        ));
        assert!(matches!(
            AdapterRegistry::new().open_reader("feed"),
            Err(Error::UnsupportedAdapter(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_stream_stops_publishing() {
        let cancel = CancellationToken::new();
        let options = StreamOptions {
            buffer_size: 1,
            cancel: cancel.clone(),
        };
        cancel.cancel();
        let mut stream = EntityStream::spawn(&options, |publisher| {
            for _ in 0..10 {
                if !publisher.publish(Ok(Entity::Agency(Default::default()))) {
                    break;
                }
            }
            Ok(())
        });
        assert!(stream.next().await.is_none());
        stream.finish().await.unwrap();
    }

    #[tokio::test]
    async fn producer_errors_surface_on_finish() {
        let mut stream = EntityStream::spawn(&StreamOptions::default(), |_| {
            Err(Error::MissingFile("stops.txt".to_owned()))
        });
        assert!(stream.next().await.is_none());
        assert!(matches!(
            stream.finish().await,
            Err(Error::MissingFile(_))
        ));
    }
}
