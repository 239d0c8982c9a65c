//! Checks spanning several records owned by the same parent
use crate::error::EntityError;
use crate::objects::StopTime;

/// Sorts the stop times of one trip by `stop_sequence` and checks them as a whole.
///
/// Any error means the trip cannot be copied with its stop times.
pub fn validate_stop_times(stop_times: &mut [StopTime]) -> Vec<EntityError> {
    let mut errors = Vec::new();
    if stop_times.len() < 2 {
        errors.push(EntityError::sequence(
            Some("trip_id"),
            stop_times.first().map(|st| st.trip_id.as_str()),
            "a trip needs at least two stop times",
        ));
        return errors;
    }
    stop_times.sort_by_key(|st| st.stop_sequence);

    for pair in stop_times.windows(2) {
        if pair[0].stop_sequence == pair[1].stop_sequence {
            errors.push(
                EntityError::sequence(
                    Some("stop_sequence"),
                    Some(&pair[1].stop_sequence.to_string()),
                    "duplicate stop_sequence in trip",
                )
                .at_line(pair[1].meta.line),
            );
        }
    }

    // times can be left empty on intermediate stops, compare with the last known one
    let mut last_time = None;
    for st in stop_times.iter() {
        if let Some(arrival) = st.arrival_time.get() {
            if let Some(last) = last_time {
                if *arrival < last {
                    errors.push(
                        EntityError::sequence(
                            Some("arrival_time"),
                            Some(&arrival.to_string()),
                            format!("arrives before the previous stop time ({})", last),
                        )
                        .at_line(st.meta.line),
                    );
                }
            }
        }
        if let Some(time) = st.departure_time.get().or(st.arrival_time.get()) {
            last_time = Some(*time);
        }
    }

    for (st, position) in [
        (stop_times.first(), "first"),
        (stop_times.last(), "last"),
    ] {
        if let Some(st) = st {
            if !st.arrival_time.is_present() && !st.departure_time.is_present() {
                errors.push(
                    EntityError::sequence(
                        Some("arrival_time"),
                        None,
                        format!("the {} stop time of a trip must be timed", position),
                    )
                    .at_line(st.meta.line),
                );
            }
        }
    }

    let mut last_dist = None;
    for st in stop_times.iter() {
        if let Some(dist) = st.shape_dist_traveled.get() {
            if matches!(last_dist, Some(last) if *dist < last) {
                errors.push(
                    EntityError::sequence(
                        Some("shape_dist_traveled"),
                        Some(&dist.to_string()),
                        "distance decreases along the trip",
                    )
                    .at_line(st.meta.line),
                );
            }
            last_dist = Some(*dist);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::opt::Opt;
    use crate::values::Seconds;

    fn st(sequence: u32, arrival: Option<u32>, departure: Option<u32>) -> StopTime {
        StopTime {
            trip_id: "t1".to_owned(),
            stop_id: format!("s{}", sequence),
            stop_sequence: sequence,
            arrival_time: Opt(arrival.map(Seconds)),
            departure_time: Opt(departure.map(Seconds)),
            ..Default::default()
        }
    }

    #[test]
    fn sorted_and_valid() {
        let mut sts = vec![
            st(3, Some(300), Some(300)),
            st(1, Some(100), Some(110)),
            st(2, None, None),
        ];
        assert!(validate_stop_times(&mut sts).is_empty());
        assert_eq!(
            vec![1, 2, 3],
            sts.iter().map(|s| s.stop_sequence).collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_sequence_and_time_travel() {
        let mut sts = vec![
            st(1, Some(100), Some(200)),
            st(1, Some(150), Some(150)),
            st(2, Some(120), Some(120)),
        ];
        let errors = validate_stop_times(&mut sts);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Sequence));
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("stop_sequence")));
        assert!(errors
            .iter()
            .any(|e| e.field.as_deref() == Some("arrival_time")));
    }

    #[test]
    fn single_stop_time() {
        let mut sts = vec![st(1, Some(100), Some(100))];
        assert_eq!(1, validate_stop_times(&mut sts).len());
    }

    #[test]
    fn untimed_last_stop() {
        let mut sts = vec![st(1, Some(100), Some(100)), st(2, None, None)];
        let errors = validate_stop_times(&mut sts);
        assert_eq!(1, errors.len());
        assert!(errors[0].message.contains("last"));
    }
}
