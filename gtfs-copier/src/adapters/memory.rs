use super::{EntityStream, Reader, StreamOptions, Writer};
use gtfs_structures::{Entity, EntityKind, Error};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

type Collections = FxHashMap<EntityKind, Vec<Entity>>;

/// A feed held in memory, mostly useful to tests and to chain copies
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    collections: Arc<Collections>,
}

impl MemoryReader {
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut collections = Collections::default();
        for entity in entities {
            collections.entry(entity.kind()).or_default().push(entity);
        }
        Self {
            collections: Arc::new(collections),
        }
    }

    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        self.collections.get(&kind).map_or(&[], Vec::as_slice)
    }

    fn stop_times(&self, trip_ids: Vec<String>, options: &StreamOptions, among: bool) -> Option<EntityStream> {
        let trip_ids: FxHashSet<String> = trip_ids.into_iter().collect();
        self.collections.get(&EntityKind::StopTime).map(|entities| {
            let kept = entities
                .iter()
                .filter(|e| match e {
                    Entity::StopTime(st) => trip_ids.contains(&st.trip_id) == among,
                    _ => false,
                })
                .cloned()
                .collect();
            EntityStream::from_entities(options, kept)
        })
    }
}

impl Reader for MemoryReader {
    fn validate_structure(&self) -> Vec<Error> {
        vec![]
    }

    fn read(&self, kind: EntityKind, options: &StreamOptions) -> Result<Option<EntityStream>, Error> {
        Ok(self
            .collections
            .get(&kind)
            .map(|entities| EntityStream::from_entities(options, entities.clone())))
    }

    fn stop_times_by_trip_ids(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        Ok(self.stop_times(trip_ids, options, true))
    }

    fn stop_times_of_other_trips(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        Ok(self.stop_times(trip_ids, options, false))
    }
}

/// Keeps what is written, natural identifiers are kept
#[derive(Debug, Default)]
pub struct MemoryWriter {
    collections: Collections,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self, kind: EntityKind) -> &[Entity] {
        self.collections.get(&kind).map_or(&[], Vec::as_slice)
    }
}

impl Writer for MemoryWriter {
    fn delete(&mut self) -> Result<(), Error> {
        self.collections.clear();
        Ok(())
    }

    fn add_entity(&mut self, entity: &Entity) -> Result<String, Error> {
        self.collections
            .entry(entity.kind())
            .or_default()
            .push(entity.clone());
        Ok(entity.entity_id().to_owned())
    }

    fn new_reader(&mut self) -> Result<Box<dyn Reader>, Error> {
        Ok(Box::new(MemoryReader {
            collections: Arc::new(self.collections.clone()),
        }))
    }
}
