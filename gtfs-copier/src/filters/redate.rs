use super::Filter;
use crate::entity_map::EntityMap;
use chrono::{Datelike, Duration, NaiveDate};
use gtfs_structures::{Calendar, Entity, EntityError, Error, Opt};

/// Moves a feed in time.
///
/// The `source_days` days starting at `start_date` are replayed, as many times as needed, over
/// the `target_days` days starting at `target_date`.
#[derive(Debug, Clone)]
pub struct RedateFilter {
    start_date: NaiveDate,
    source_days: i64,
    target_date: NaiveDate,
    target_days: i64,
}

impl RedateFilter {
    pub fn new(
        start_date: NaiveDate,
        source_days: i64,
        target_date: NaiveDate,
        target_days: i64,
    ) -> Result<Self, Error> {
        if source_days < 1 || target_days < 1 {
            return Err(Error::InvalidConfiguration(format!(
                "redate needs at least one source and one target day, got {} and {}",
                source_days, target_days
            )));
        }
        Ok(Self {
            start_date,
            source_days,
            target_date,
            target_days,
        })
    }

    fn target_end(&self) -> NaiveDate {
        self.target_date + Duration::days(self.target_days - 1)
    }

    // the source date replayed on the given target day
    fn source_date(&self, target_offset: i64) -> NaiveDate {
        self.start_date + Duration::days(target_offset % self.source_days)
    }

    fn redate_calendar(&self, calendar: &mut Calendar) {
        let source = calendar.clone();
        let in_range = |date: NaiveDate| {
            source.start_date.map_or(true, |start| start <= date)
                && source.end_date.map_or(true, |end| date <= end)
        };
        let mut flags = Calendar::default();
        for offset in 0..self.target_days {
            let date = self.source_date(offset);
            if in_range(date) && source.runs_on(date.weekday()) {
                let target = self.target_date + Duration::days(offset);
                flags.set_runs_on(target.weekday(), true);
            }
        }
        for weekday in WEEK {
            calendar.set_runs_on(weekday, flags.runs_on(weekday));
        }
        calendar.start_date = Opt::new(self.target_date);
        calendar.end_date = Opt::new(self.target_end());
    }

    // every target date replaying `date`, empty when it is outside the source window
    fn target_dates(&self, date: NaiveDate) -> Vec<NaiveDate> {
        let offset = (date - self.start_date).num_days();
        if offset < 0 || offset >= self.source_days {
            return vec![];
        }
        (offset..self.target_days)
            .step_by(self.source_days as usize)
            .map(|o| self.target_date + Duration::days(o))
            .collect()
    }
}

const WEEK: [chrono::Weekday; 7] = [
    chrono::Weekday::Mon,
    chrono::Weekday::Tue,
    chrono::Weekday::Wed,
    chrono::Weekday::Thu,
    chrono::Weekday::Fri,
    chrono::Weekday::Sat,
    chrono::Weekday::Sun,
];

impl Filter for RedateFilter {
    fn name(&self) -> &str {
        "redate"
    }

    fn filter(&mut self, entity: &mut Entity, _map: &EntityMap) -> Result<(), EntityError> {
        match entity {
            Entity::Calendar(calendar) => self.redate_calendar(calendar),
            Entity::FeedInfo(info) => {
                if info.start_date.is_present() {
                    info.start_date = Opt::new(self.target_date);
                }
                if info.end_date.is_present() {
                    info.end_date = Opt::new(self.target_end());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn expand(
        &mut self,
        entity: &Entity,
        _map: &EntityMap,
    ) -> Result<Option<Vec<Entity>>, EntityError> {
        let calendar_date = match entity {
            Entity::CalendarDate(cd) => cd,
            _ => return Ok(None),
        };
        let date = match *calendar_date.date {
            Some(date) => date,
            None => return Ok(None),
        };
        let outputs = self
            .target_dates(date)
            .into_iter()
            .map(|target| {
                let mut cd = calendar_date.clone();
                cd.date = Opt::new(target);
                Entity::CalendarDate(cd)
            })
            .collect();
        Ok(Some(outputs))
    }
}
