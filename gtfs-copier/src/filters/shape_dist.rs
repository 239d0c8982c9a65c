use super::Filter;
use crate::entity_map::EntityMap;
use geo_types::Point;
use gtfs_structures::{Entity, EntityError, Opt};

const EARTH_RADIUS: f64 = 6371.0; // Earth radius in kilometers

/// Great circle distance in metres
pub fn haversine_distance(a: &Point<f64>, b: &Point<f64>) -> f64 {
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + a.y().to_radians().cos() * b.y().to_radians().cos() * (d_lon / 2.0).sin()
            * (d_lon / 2.0).sin();

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS * c * 1000.0
}

/// Fills the missing `shape_dist_traveled` of stop times with the distance, in metres, covered
/// from the first stop of the trip. Stop times must come grouped by trip, in sequence order.
#[derive(Debug, Default, Clone)]
pub struct ShapeDistFilter {
    trip_id: String,
    last: Option<Point<f64>>,
    travelled: f64,
}

impl ShapeDistFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for ShapeDistFilter {
    fn name(&self) -> &str {
        "shape_dist"
    }

    fn filter(&mut self, entity: &mut Entity, map: &EntityMap) -> Result<(), EntityError> {
        let stop_time = match entity {
            Entity::StopTime(st) => st,
            _ => return Ok(()),
        };
        if stop_time.trip_id != self.trip_id {
            self.trip_id = stop_time.trip_id.clone();
            self.last = None;
            self.travelled = 0.0;
        }
        if let Some(point) = map.get_stop_geometry(&stop_time.stop_id) {
            if let Some(last) = &self.last {
                self.travelled += haversine_distance(last, point);
            }
            self.last = Some(*point);
            if !stop_time.shape_dist_traveled.is_present() {
                stop_time.shape_dist_traveled = Opt::new(self.travelled.round());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::StopTime;

    fn stop_time(trip: &str, stop: &str) -> Entity {
        StopTime {
            trip_id: trip.to_owned(),
            stop_id: stop.to_owned(),
            ..Default::default()
        }
        .into()
    }

    fn dist(entity: &Entity) -> Option<f64> {
        match entity {
            Entity::StopTime(st) => *st.shape_dist_traveled,
            _ => None,
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_distance(&Point::new(0.0, 0.0), &Point::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 1.0, "{}", d);
    }

    #[test]
    fn cumulative_per_trip() {
        let mut map = EntityMap::new();
        map.add_stop_geometry("a", Point::new(0.0, 0.0));
        map.add_stop_geometry("b", Point::new(0.0, 0.01));
        map.add_stop_geometry("c", Point::new(0.0, 0.02));
        let mut filter = ShapeDistFilter::new();
        let mut entities = vec![
            stop_time("t1", "a"),
            stop_time("t1", "b"),
            stop_time("t1", "c"),
            stop_time("t2", "c"),
        ];
        for e in entities.iter_mut() {
            filter.filter(e, &map).unwrap();
        }
        assert_eq!(Some(0.0), dist(&entities[0]));
        assert_eq!(Some(1112.0), dist(&entities[1]));
        assert_eq!(Some(2224.0), dist(&entities[2]));
        assert_eq!(Some(0.0), dist(&entities[3]));
    }
}
