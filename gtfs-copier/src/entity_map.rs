use geo_types::{Coord, LineString, Point};
use gtfs_structures::{Entity, Error, KeyMap};
use rustc_hash::FxHashMap;

/// Correspondence between the identifiers of the source and the ones assigned by the destination.
///
/// Keys are `(collection, old id)`. The copier writes an entry once the destination has accepted
/// the entity, filters and reference rewriting only read it.
#[derive(Debug, Default, Clone)]
pub struct EntityMap {
    ids: FxHashMap<String, FxHashMap<String, String>>,
    stop_geometries: FxHashMap<String, Point<f64>>,
    shape_geometries: FxHashMap<String, ShapeGeometry>,
}

// points kept sorted by `shape_pt_sequence`, whatever order they were read in
#[derive(Debug, Clone)]
struct ShapeGeometry {
    sequences: Vec<u32>,
    line: LineString<f64>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `old_id` of `collection` was written as `new_id`. A second call for the same
    /// key overwrites the first one.
    pub fn set(&mut self, collection: &str, old_id: &str, new_id: &str) -> Result<(), Error> {
        self.ids
            .entry(collection.to_owned())
            .or_default()
            .insert(old_id.to_owned(), new_id.to_owned());
        Ok(())
    }

    /// New identifier of `old_id`. Unknown collections are simply empty
    pub fn get(&self, collection: &str, old_id: &str) -> Option<&str> {
        self.ids
            .get(collection)
            .and_then(|ids| ids.get(old_id))
            .map(String::as_str)
    }

    /// New identifier of an entity, looked up with its collection and current identifier
    pub fn get_entity(&self, entity: &Entity) -> Option<&str> {
        self.get(entity.collection(), entity.entity_id())
    }

    pub fn contains(&self, collection: &str, old_id: &str) -> bool {
        self.get(collection, old_id).is_some()
    }

    /// Every old identifier seen for the collection, sorted
    pub fn keys_for(&self, collection: &str) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .ids
            .get(collection)
            .map(|ids| ids.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Number of identifiers recorded for the collection
    pub fn len(&self, collection: &str) -> usize {
        self.ids.get(collection).map_or(0, |ids| ids.len())
    }

    /// Merges `other` into this map, `other` wins on conflicts
    pub fn update(&mut self, other: &EntityMap) {
        for (collection, ids) in &other.ids {
            let own = self.ids.entry(collection.clone()).or_default();
            for (old, new) in ids {
                own.insert(old.clone(), new.clone());
            }
        }
        for (id, point) in &other.stop_geometries {
            self.stop_geometries.insert(id.clone(), *point);
        }
        for (id, shape) in &other.shape_geometries {
            self.shape_geometries.insert(id.clone(), shape.clone());
        }
    }

    pub fn get_stop_geometry(&self, old_stop_id: &str) -> Option<&Point<f64>> {
        self.stop_geometries.get(old_stop_id)
    }

    pub fn add_stop_geometry(&mut self, old_stop_id: &str, point: Point<f64>) {
        self.stop_geometries.insert(old_stop_id.to_owned(), point);
    }

    pub fn get_shape_geometry(&self, old_shape_id: &str) -> Option<&LineString<f64>> {
        self.shape_geometries.get(old_shape_id).map(|shape| &shape.line)
    }

    /// Inserts one point of a shape at its `sequence`. Returns `false` when the shape already had
    /// a point with this sequence, the new one then goes after it.
    pub fn add_shape_point(&mut self, old_shape_id: &str, sequence: u32, longitude: f64, latitude: f64) -> bool {
        let shape = self
            .shape_geometries
            .entry(old_shape_id.to_owned())
            .or_insert_with(|| ShapeGeometry {
                sequences: Vec::new(),
                line: LineString::new(Vec::new()),
            });
        let at = shape.sequences.partition_point(|s| *s <= sequence);
        let unique = at == 0 || shape.sequences[at - 1] != sequence;
        shape.sequences.insert(at, sequence);
        shape.line.0.insert(
            at,
            Coord {
                x: longitude,
                y: latitude,
            },
        );
        unique
    }
}

impl KeyMap for EntityMap {
    fn get(&self, collection: &str, old_id: &str) -> Option<&str> {
        EntityMap::get(self, collection, old_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::Stop;

    #[test]
    fn set_then_get() {
        let mut map = EntityMap::new();
        map.set("stops.txt", "a", "1").unwrap();
        assert_eq!(Some("1"), map.get("stops.txt", "a"));
        assert_eq!(None, map.get("stops.txt", "b"));
        assert_eq!(None, map.get("routes.txt", "a"));
    }

    #[test]
    fn unknown_collection() {
        let map = EntityMap::new();
        assert_eq!(None, map.get("no_such_collection", "x"));
        assert!(map.keys_for("no_such_collection").is_empty());
        assert_eq!(0, map.len("no_such_collection"));
    }

    #[test]
    fn get_entity_uses_collection_and_id() {
        let mut map = EntityMap::new();
        map.set("stops.txt", "s1", "100").unwrap();
        let stop = Entity::Stop(Stop {
            id: "s1".to_owned(),
            ..Default::default()
        });
        assert_eq!(Some("100"), map.get_entity(&stop));
    }

    #[test]
    fn keys_are_sorted() {
        let mut map = EntityMap::new();
        for id in ["c", "a", "b"] {
            map.set("trips.txt", id, id).unwrap();
        }
        assert_eq!(vec!["a", "b", "c"], map.keys_for("trips.txt"));
    }

    #[test]
    fn update_prefers_other() {
        let mut map = EntityMap::new();
        map.set("stops.txt", "a", "1").unwrap();
        map.set("stops.txt", "b", "2").unwrap();
        let mut other = EntityMap::new();
        other.set("stops.txt", "a", "10").unwrap();
        other.set("routes.txt", "r", "20").unwrap();
        other.add_stop_geometry("a", Point::new(2.0, 48.0));
        map.update(&other);
        assert_eq!(Some("10"), map.get("stops.txt", "a"));
        assert_eq!(Some("2"), map.get("stops.txt", "b"));
        assert_eq!(Some("20"), map.get("routes.txt", "r"));
        assert_eq!(Some(&Point::new(2.0, 48.0)), map.get_stop_geometry("a"));
    }

    #[test]
    fn shape_points_follow_their_sequence() {
        let mut map = EntityMap::new();
        assert!(map.add_shape_point("s", 2, 2.0, 48.0));
        assert!(map.add_shape_point("s", 1, 1.0, 48.0));
        assert!(map.add_shape_point("s", 3, 3.0, 48.0));
        let line = map.get_shape_geometry("s").unwrap();
        let longitudes: Vec<f64> = line.0.iter().map(|c| c.x).collect();
        assert_eq!(vec![1.0, 2.0, 3.0], longitudes);
    }

    #[test]
    fn repeated_shape_sequence() {
        let mut map = EntityMap::new();
        assert!(map.add_shape_point("s", 1, 1.0, 48.0));
        assert!(map.add_shape_point("s", 2, 2.0, 48.0));
        assert!(!map.add_shape_point("s", 1, 1.5, 48.0));
        let longitudes: Vec<f64> = map.get_shape_geometry("s").unwrap().0.iter().map(|c| c.x).collect();
        assert_eq!(vec![1.0, 1.5, 2.0], longitudes);
    }
}
