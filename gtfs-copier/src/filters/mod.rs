//! Stages run on every entity before its references are rewritten.
//!
//! A stage sees source identifiers: nothing is remapped yet. Stages are constructed once per copy
//! and may keep state between entities.
use crate::entity_map::EntityMap;
use gtfs_structures::{Entity, EntityError};

mod agency;
mod prefix;
mod redate;
mod service;
mod shape_dist;

pub use agency::{AgencyTimezoneFilter, DefaultAgencyFilter};
pub use prefix::PrefixFilter;
pub use redate::RedateFilter;
pub use service::{ImplicitServiceExpander, NetworkExpander};
pub use shape_dist::ShapeDistFilter;

/// A transform stage. Both methods default to letting the entity through untouched
pub trait Filter: Send {
    fn name(&self) -> &str;

    /// Mutates the entity in place, or rejects it with an error
    fn filter(&mut self, _entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
        Ok(())
    }

    /// Replaces the entity with zero or more entities. `None` keeps it as is
    fn expand(
        &mut self,
        _entity: &Entity,
        _map: &EntityMap,
    ) -> Result<Option<Vec<Entity>>, EntityError> {
        Ok(None)
    }
}

/// Stages, in registration order
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Filter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stage: Box<dyn Filter>) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Every `filter` in order, then every `expand` in order
    pub fn apply(&mut self, mut entity: Entity, map: &EntityMap) -> Result<Vec<Entity>, EntityError> {
        self.filter(&mut entity, map)?;
        self.expand(entity, map)
    }

    /// Every `filter`, in order. The first error wins
    pub fn filter(&mut self, entity: &mut Entity, map: &EntityMap) -> Result<(), EntityError> {
        for stage in self.stages.iter_mut() {
            stage.filter(entity, map)?;
        }
        Ok(())
    }

    /// Every `expand`, in order: the outputs of a stage go through the expansions of the stages
    /// registered after it.
    pub fn expand(&mut self, entity: Entity, map: &EntityMap) -> Result<Vec<Entity>, EntityError> {
        let mut entities = vec![entity];
        for stage in self.stages.iter_mut() {
            let mut next = Vec::with_capacity(entities.len());
            for entity in entities {
                match stage.expand(&entity, map)? {
                    Some(outputs) => next.extend(outputs),
                    None => next.push(entity),
                }
            }
            entities = next;
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::{Agency, Route};

    struct Rename(&'static str);

    impl Filter for Rename {
        fn name(&self) -> &str {
            "rename"
        }

        fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
            let id = format!("{}{}", entity.entity_id(), self.0);
            entity.set_entity_id(id);
            Ok(())
        }
    }

    struct Reject;

    impl Filter for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
            if entity.entity_id().starts_with('x') {
                Err(EntityError::filter("rejected"))
            } else {
                Ok(())
            }
        }
    }

    struct Twice;

    impl Filter for Twice {
        fn name(&self) -> &str {
            "twice"
        }

        fn expand(
            &mut self,
            entity: &Entity,
            _map: &EntityMap,
        ) -> Result<Option<Vec<Entity>>, EntityError> {
            let mut copy = entity.clone();
            copy.set_entity_id(format!("{}-bis", entity.entity_id()));
            Ok(Some(vec![entity.clone(), copy]))
        }
    }

    fn route(id: &str) -> Entity {
        Route {
            id: id.to_owned(),
            ..Default::default()
        }
        .into()
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(Entity::entity_id).collect()
    }

    #[test]
    fn stages_run_in_registration_order() {
        let mut pipeline = Pipeline::new();
        pipeline.add(Box::new(Rename("a")));
        pipeline.add(Box::new(Rename("b")));
        let out = pipeline.apply(route("r"), &EntityMap::new()).unwrap();
        assert_eq!(vec!["rab"], ids(&out));
    }

    #[test]
    fn error_stops_the_entity() {
        let mut pipeline = Pipeline::new();
        pipeline.add(Box::new(Reject));
        pipeline.add(Box::new(Twice));
        let err = pipeline.apply(route("x1"), &EntityMap::new()).unwrap_err();
        assert_eq!(gtfs_structures::ErrorKind::Filter, err.kind);
        assert_eq!(2, pipeline.apply(route("r"), &EntityMap::new()).unwrap().len());
    }

    #[test]
    fn expansions_chain() {
        let mut pipeline = Pipeline::new();
        pipeline.add(Box::new(Twice));
        pipeline.add(Box::new(Twice));
        let out = pipeline
            .apply(Agency::default().into(), &EntityMap::new())
            .unwrap();
        assert_eq!(vec!["", "-bis", "-bis", "-bis-bis"], ids(&out));
    }
}
