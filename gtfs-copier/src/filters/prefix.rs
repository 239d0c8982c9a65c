use super::Filter;
use crate::entity_map::EntityMap;
use gtfs_structures::{Entity, EntityError, Opt};
use rustc_hash::FxHashMap;

fn prefixed(prefix: &str, value: &mut Opt<String>) {
    if let Some(v) = value.as_mut() {
        if !v.is_empty() {
            v.insert_str(0, prefix);
        }
    }
}

/// Prepends a prefix to the identifiers of some collections, to merge feeds whose identifiers
/// collide.
///
/// References are left alone: they reach the prefixed identifiers through the identifier map.
/// Zones are not a collection, so the prefix of `stops.txt` is applied to them directly.
#[derive(Debug, Default, Clone)]
pub struct PrefixFilter {
    prefixes: FxHashMap<String, String>,
}

impl PrefixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the prefix of a collection
    pub fn with_prefix(mut self, collection: &str, prefix: &str) -> Self {
        self.prefixes.insert(collection.to_owned(), prefix.to_owned());
        self
    }

    fn prefix(&self, collection: &str) -> Option<&str> {
        self.prefixes
            .get(collection)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

impl Filter for PrefixFilter {
    fn name(&self) -> &str {
        "prefix"
    }

    fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
        if let Some(prefix) = self.prefix(entity.collection()) {
            if !entity.entity_id().is_empty() {
                let id = format!("{}{}", prefix, entity.entity_id());
                entity.set_entity_id(id);
            }
        }
        let zone_prefix = match self.prefix("stops.txt") {
            Some(prefix) => prefix,
            None => return Ok(()),
        };
        match entity {
            Entity::Stop(stop) => prefixed(zone_prefix, &mut stop.zone_id),
            Entity::FareRule(rule) => {
                prefixed(zone_prefix, &mut rule.origin_id);
                prefixed(zone_prefix, &mut rule.destination_id);
                prefixed(zone_prefix, &mut rule.contains_id);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::{FareRule, Route, Stop};

    #[test]
    fn stop_and_zone() {
        let mut filter = PrefixFilter::new().with_prefix("stops.txt", "feedA-");
        let mut stop: Entity = Stop {
            id: "123".to_owned(),
            zone_id: "z1".into(),
            ..Default::default()
        }
        .into();
        filter.filter(&mut stop, &EntityMap::new()).unwrap();
        match stop {
            Entity::Stop(s) => {
                assert_eq!("feedA-123", s.id);
                assert_eq!(Some("feedA-z1"), s.zone_id.as_deref());
            }
            _ => unreachable!(),
        }

        let mut rule: Entity = FareRule {
            fare_id: "f".to_owned(),
            origin_id: "z1".into(),
            ..Default::default()
        }
        .into();
        filter.filter(&mut rule, &EntityMap::new()).unwrap();
        match rule {
            Entity::FareRule(r) => {
                assert_eq!("f", r.fare_id);
                assert_eq!(Some("feedA-z1"), r.origin_id.as_deref());
                assert!(r.destination_id.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn other_collections_untouched() {
        let mut filter = PrefixFilter::new().with_prefix("stops.txt", "feedA-");
        let mut route: Entity = Route {
            id: "r".to_owned(),
            ..Default::default()
        }
        .into();
        filter.filter(&mut route, &EntityMap::new()).unwrap();
        assert_eq!("r", route.entity_id());
    }
}
