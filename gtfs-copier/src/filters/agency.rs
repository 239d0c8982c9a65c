use super::Filter;
use crate::entity_map::EntityMap;
use gtfs_structures::{Entity, EntityError, Opt, LOCATION_STATION};

/// Gives the agency of a single agency feed to the routes and fares that do not name one
#[derive(Debug, Default, Clone)]
pub struct DefaultAgencyFilter {
    agencies: Vec<String>,
}

impl DefaultAgencyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_agency(&self) -> Option<&str> {
        match self.agencies.as_slice() {
            [single] if !single.is_empty() => Some(single),
            _ => None,
        }
    }
}

impl Filter for DefaultAgencyFilter {
    fn name(&self) -> &str {
        "default_agency"
    }

    fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
        let agency_id = match entity {
            Entity::Agency(agency) => {
                if !self.agencies.contains(&agency.id) {
                    self.agencies.push(agency.id.clone());
                }
                return Ok(());
            }
            Entity::Route(route) => &mut route.agency_id,
            Entity::FareAttribute(fare) => &mut fare.agency_id,
            _ => return Ok(()),
        };
        if !agency_id.is_present() {
            if let Some(default) = self.default_agency() {
                *agency_id = Opt::from(default);
            }
        }
        Ok(())
    }
}

/// Gives the timezone of the agencies to the stations that have none, as long as all the agencies
/// agree on it
#[derive(Debug, Default, Clone)]
pub struct AgencyTimezoneFilter {
    timezones: Vec<String>,
}

impl AgencyTimezoneFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for AgencyTimezoneFilter {
    fn name(&self) -> &str {
        "agency_timezone"
    }

    fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
        match entity {
            Entity::Agency(agency) => {
                if !agency.timezone.is_empty() && !self.timezones.contains(&agency.timezone) {
                    self.timezones.push(agency.timezone.clone());
                }
            }
            Entity::Stop(stop) if stop.location_type() == LOCATION_STATION => {
                if let ([timezone], false) = (self.timezones.as_slice(), stop.timezone.is_present()) {
                    stop.timezone = Opt::from(timezone.as_str());
                }
            }
            _ => {}
        }
        Ok(())
    }
}
