use super::Filter;
use crate::entity_map::EntityMap;
use gtfs_structures::{Calendar, Entity, EntityError, Network, Opt};
use rustc_hash::FxHashSet;

/// Creates the networks that routes name but `networks.txt` does not define
#[derive(Debug, Default, Clone)]
pub struct NetworkExpander {
    created: FxHashSet<String>,
}

impl NetworkExpander {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for NetworkExpander {
    fn name(&self) -> &str {
        "network"
    }

    fn expand(
        &mut self,
        entity: &Entity,
        map: &EntityMap,
    ) -> Result<Option<Vec<Entity>>, EntityError> {
        let network_id = match entity {
            Entity::Route(route) => match route.network_id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        if map.contains("networks.txt", network_id) || self.created.contains(network_id) {
            return Ok(None);
        }
        self.created.insert(network_id.to_owned());
        let network = Network {
            id: network_id.to_owned(),
            ..Default::default()
        };
        Ok(Some(vec![network.into(), entity.clone()]))
    }
}

/// Creates the services that only exist through `calendar_dates.txt`.
///
/// The calendar created runs no weekday, so the service only runs on its added dates.
#[derive(Debug, Default, Clone)]
pub struct ImplicitServiceExpander {
    created: FxHashSet<String>,
}

impl ImplicitServiceExpander {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for ImplicitServiceExpander {
    fn name(&self) -> &str {
        "implicit_service"
    }

    fn expand(
        &mut self,
        entity: &Entity,
        map: &EntityMap,
    ) -> Result<Option<Vec<Entity>>, EntityError> {
        let calendar_date = match entity {
            Entity::CalendarDate(cd) => cd,
            _ => return Ok(None),
        };
        let service_id = calendar_date.service_id.as_str();
        if service_id.is_empty()
            || map.contains("calendar.txt", service_id)
            || self.created.contains(service_id)
        {
            return Ok(None);
        }
        let date = match *calendar_date.date {
            Some(date) => date,
            None => return Ok(None),
        };
        self.created.insert(service_id.to_owned());
        let calendar = Calendar {
            id: service_id.to_owned(),
            start_date: Opt::new(date),
            end_date: Opt::new(date),
            ..Default::default()
        };
        Ok(Some(vec![calendar.into(), entity.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gtfs_structures::{CalendarDate, Route};

    #[test]
    fn network_created_once() {
        let mut expander = NetworkExpander::new();
        let route = |id: &str| -> Entity {
            Route {
                id: id.to_owned(),
                network_id: "N1".into(),
                ..Default::default()
            }
            .into()
        };
        let map = EntityMap::new();
        let out = expander.expand(&route("r1"), &map).unwrap().unwrap();
        assert_eq!(2, out.len());
        assert!(matches!(&out[0], Entity::Network(n) if n.id == "N1"));
        assert!(expander.expand(&route("r2"), &map).unwrap().is_none());

        let mut known = EntityMap::new();
        known.set("networks.txt", "N1", "N1").unwrap();
        assert!(NetworkExpander::new()
            .expand(&route("r1"), &known)
            .unwrap()
            .is_none());
    }

    #[test]
    fn implicit_service() {
        let mut expander = ImplicitServiceExpander::new();
        let date = NaiveDate::from_ymd_opt(2022, 1, 4).unwrap();
        let cd: Entity = CalendarDate {
            service_id: "holiday".to_owned(),
            date: Opt::new(date),
            exception_type: 1,
            ..Default::default()
        }
        .into();
        let out = expander.expand(&cd, &EntityMap::new()).unwrap().unwrap();
        match &out[0] {
            Entity::Calendar(c) => {
                assert_eq!("holiday", c.id);
                assert_eq!(Some(date), *c.start_date);
                assert!(!c.monday && !c.sunday);
            }
            e => panic!("expected a calendar, got {:?}", e),
        }
        assert!(matches!(&out[1], Entity::CalendarDate(_)));
        assert!(expander.expand(&cd, &EntityMap::new()).unwrap().is_none());
    }
}
