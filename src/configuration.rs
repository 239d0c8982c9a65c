//! What a copy should do: the JSON configuration file, completed by the command line
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use gtfs_copier::filters::{
    AgencyTimezoneFilter, DefaultAgencyFilter, Filter, ImplicitServiceExpander, NetworkExpander,
    PrefixFilter, RedateFilter, ShapeDistFilter,
};
use gtfs_copier::CopierOptions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One stage, as named in the configuration file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Collection name -> prefix
    Prefix { prefixes: BTreeMap<String, String> },
    Redate {
        start_date: NaiveDate,
        source_days: i64,
        target_date: NaiveDate,
        target_days: i64,
    },
    DefaultAgency,
    AgencyTimezone,
    Network,
    ImplicitService,
    ShapeDist,
}

impl FilterConfig {
    pub fn build(&self) -> Result<Box<dyn Filter>> {
        Ok(match self {
            FilterConfig::Prefix { prefixes } => Box::new(
                prefixes
                    .iter()
                    .fold(PrefixFilter::new(), |f, (collection, prefix)| {
                        f.with_prefix(collection, prefix)
                    }),
            ),
            FilterConfig::Redate {
                start_date,
                source_days,
                target_date,
                target_days,
            } => Box::new(RedateFilter::new(
                *start_date,
                *source_days,
                *target_date,
                *target_days,
            )?),
            FilterConfig::DefaultAgency => Box::new(DefaultAgencyFilter::new()),
            FilterConfig::AgencyTimezone => Box::new(AgencyTimezoneFilter::new()),
            FilterConfig::Network => Box::new(NetworkExpander::new()),
            FilterConfig::ImplicitService => Box::new(ImplicitServiceExpander::new()),
            FilterConfig::ShapeDist => Box::new(ShapeDistFilter::new()),
        })
    }

    /// `FILE=PREFIX`
    pub fn parse_prefix(arg: &str) -> Result<Self> {
        let (collection, prefix) = match arg.split_once('=') {
            Some((c, p)) if !c.is_empty() && !p.is_empty() => (c, p),
            _ => bail!("expected FILE=PREFIX, got '{arg}'"),
        };
        let collection = if collection.ends_with(".txt") {
            collection.to_owned()
        } else {
            format!("{collection}.txt")
        };
        Ok(FilterConfig::Prefix {
            prefixes: BTreeMap::from([(collection, prefix.to_owned())]),
        })
    }

    /// `START:SOURCE_DAYS:TARGET:TARGET_DAYS`, dates as `YYYYMMDD`
    pub fn parse_redate(arg: &str) -> Result<Self> {
        let parts: Vec<&str> = arg.split(':').collect();
        let [start, source_days, target, target_days] = parts.as_slice() else {
            bail!("expected START:SOURCE_DAYS:TARGET:TARGET_DAYS, got '{arg}'");
        };
        let date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y%m%d").with_context(|| format!("'{s}' is not a YYYYMMDD date"))
        };
        let days = |s: &str| {
            s.parse::<i64>()
                .with_context(|| format!("'{s}' is not a number of days"))
        };
        Ok(FilterConfig::Redate {
            start_date: date(start)?,
            source_days: days(source_days)?,
            target_date: date(target)?,
            target_days: days(target_days)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub options: CopierOptions,
    /// Stages, in the order they run
    pub filters: Vec<FilterConfig>,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open configuration {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("invalid configuration {}", path.display()))
    }

    /// Adds the expanders every copy wants, unless the configuration already places them
    pub fn with_default_expanders(mut self) -> Self {
        for expander in [FilterConfig::Network, FilterConfig::ImplicitService] {
            if !self.filters.contains(&expander) {
                self.filters.push(expander);
            }
        }
        self
    }

    pub fn build_filters(&self) -> Result<Vec<Box<dyn Filter>>> {
        self.filters.iter().map(FilterConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file() {
        let configuration: Configuration = serde_json::from_str(
            r#"{
                "options": {"batch_size": 50, "fail_fast": true},
                "filters": [
                    {"type": "prefix", "prefixes": {"stops.txt": "feedA-"}},
                    {"type": "redate", "start_date": "2018-06-03", "source_days": 7,
                     "target_date": "2022-01-02", "target_days": 28},
                    {"type": "default_agency"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(50, configuration.options.batch_size);
        assert_eq!(1000, configuration.options.buffer_size);
        assert!(configuration.options.fail_fast);
        assert_eq!(3, configuration.filters.len());
        assert_eq!(
            3,
            configuration.build_filters().unwrap().len()
        );
    }

    #[test]
    fn empty_file() {
        let configuration: Configuration = serde_json::from_str("{}").unwrap();
        let configuration = configuration.with_default_expanders();
        assert_eq!(
            vec![FilterConfig::Network, FilterConfig::ImplicitService],
            configuration.filters
        );
    }

    #[test]
    fn command_line_forms() {
        assert_eq!(
            FilterConfig::Prefix {
                prefixes: BTreeMap::from([("stops.txt".to_owned(), "a-".to_owned())])
            },
            FilterConfig::parse_prefix("stops=a-").unwrap()
        );
        assert!(FilterConfig::parse_prefix("stops").is_err());
        assert_eq!(
            FilterConfig::Redate {
                start_date: NaiveDate::from_ymd_opt(2018, 6, 3).unwrap(),
                source_days: 7,
                target_date: NaiveDate::from_ymd_opt(2022, 1, 2).unwrap(),
                target_days: 28,
            },
            FilterConfig::parse_redate("20180603:7:20220102:28").unwrap()
        );
        assert!(FilterConfig::parse_redate("20180603:7").is_err());
    }

    #[test]
    fn invalid_redate_is_rejected_when_built() {
        let config = FilterConfig::parse_redate("20180603:0:20220102:28").unwrap();
        assert!(config.build().is_err());
    }
}
