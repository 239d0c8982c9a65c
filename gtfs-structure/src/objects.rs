use crate::entity::{Meta, Record};
use crate::error::EntityError;
use crate::field;
use crate::opt::Opt;
use crate::schema::FieldDef;
use crate::values::{Color, Seconds};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! meta_accessors {
    () => {
        fn meta(&self) -> &Meta {
            &self.meta
        }
        fn meta_mut(&mut self) -> &mut Meta {
            &mut self.meta
        }
    };
}

const LATITUDE: (f64, f64) = (-90.0, 90.0);
const LONGITUDE: (f64, f64) = (-180.0, 180.0);

/// General information about the dataset. See <https://gtfs.org/reference/static/#feed_infotxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedInfo {
    /// Publisher of the feed
    #[serde(rename = "feed_publisher_name")]
    pub name: String,
    /// Website of the publisher
    #[serde(rename = "feed_publisher_url")]
    pub url: String,
    /// Language of the texts of the feed
    #[serde(rename = "feed_lang")]
    pub lang: String,
    /// Language to use when the rider's one is unknown
    pub default_lang: Opt<String>,
    /// First day the feed is complete for
    #[serde(rename = "feed_start_date")]
    pub start_date: Opt<NaiveDate>,
    /// Last day the feed is complete for
    #[serde(rename = "feed_end_date")]
    pub end_date: Opt<NaiveDate>,
    /// Free form version
    #[serde(rename = "feed_version")]
    pub version: Opt<String>,
    /// Contact about the feed itself
    #[serde(rename = "feed_contact_email")]
    pub contact_email: Opt<String>,
    /// Contact page about the feed itself
    #[serde(rename = "feed_contact_url")]
    pub contact_url: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static FEED_INFO_FIELDS: &[FieldDef<FeedInfo>] = &[
    field!(FeedInfo, "feed_publisher_name", name).required(),
    field!(FeedInfo, "feed_publisher_url", url).required(),
    field!(FeedInfo, "feed_lang", lang).required(),
    field!(FeedInfo, "default_lang", default_lang),
    field!(FeedInfo, "feed_start_date", start_date),
    field!(FeedInfo, "feed_end_date", end_date),
    field!(FeedInfo, "feed_version", version),
    field!(FeedInfo, "feed_contact_email", contact_email),
    field!(FeedInfo, "feed_contact_url", contact_url),
];

impl Record for FeedInfo {
    const COLLECTION: &'static str = "feed_info.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        FEED_INFO_FIELDS
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if let (Some(start), Some(end)) = (self.start_date.get(), self.end_date.get()) {
            if end < start {
                errors.push(EntityError::invalid_field(
                    "feed_end_date",
                    &end.format("%Y%m%d").to_string(),
                    "ends before feed_start_date",
                ));
            }
        }
    }

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if !self.version.is_present() {
            warnings.push(EntityError::warning(
                Some("feed_version"),
                "feed version is recommended",
            ));
        }
    }
}

impl fmt::Display for FeedInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// General informations about the agency running the network. See <https://gtfs.org/reference/static/#agencytxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    /// Unique technical (not for the traveller) identifier for the Agency. Can be empty in single agency feeds
    #[serde(rename = "agency_id")]
    pub id: String,
    /// Name shown to riders
    #[serde(rename = "agency_name")]
    pub name: String,
    /// Website of the agency
    #[serde(rename = "agency_url")]
    pub url: String,
    /// tz database name, e.g. `Europe/Paris`. Times of the feed are local to it
    #[serde(rename = "agency_timezone")]
    pub timezone: String,
    /// ISO 639-1 code
    #[serde(rename = "agency_lang")]
    pub lang: Opt<String>,
    /// Voice telephone number
    #[serde(rename = "agency_phone")]
    pub phone: Opt<String>,
    /// Where to buy tickets online
    #[serde(rename = "agency_fare_url")]
    pub fare_url: Opt<String>,
    /// Customer service address
    #[serde(rename = "agency_email")]
    pub email: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static AGENCY_FIELDS: &[FieldDef<Agency>] = &[
    field!(Agency, "agency_id", id),
    field!(Agency, "agency_name", name).required(),
    field!(Agency, "agency_url", url).required(),
    field!(Agency, "agency_timezone", timezone).required(),
    field!(Agency, "agency_lang", lang),
    field!(Agency, "agency_phone", phone),
    field!(Agency, "agency_fare_url", fare_url),
    field!(Agency, "agency_email", email),
];

impl Record for Agency {
    const COLLECTION: &'static str = "agency.txt";
    const ID_COLUMN: Option<&'static str> = Some("agency_id");

    fn fields() -> &'static [FieldDef<Self>] {
        AGENCY_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if self.id.is_empty() {
            warnings.push(EntityError::warning(
                Some("agency_id"),
                "agency_id is recommended, it is required as soon as the feed has several agencies",
            ));
        }
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Levels within stations. See <https://gtfs.org/reference/static/#levelstxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Referenced by [Stop::level_id]
    #[serde(rename = "level_id")]
    pub id: String,
    /// Numeric index of the level that indicates relative position of this level in relation to other levels
    #[serde(rename = "level_index")]
    pub index: f64,
    /// Name shown to riders, e.g. `Mezzanine`
    #[serde(rename = "level_name")]
    pub name: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static LEVEL_FIELDS: &[FieldDef<Level>] = &[
    field!(Level, "level_id", id).required(),
    field!(Level, "level_index", index).required(),
    field!(Level, "level_name", name),
];

impl Record for Level {
    const COLLECTION: &'static str = "levels.txt";
    const ID_COLUMN: Option<&'static str> = Some("level_id");

    fn fields() -> &'static [FieldDef<Self>] {
        LEVEL_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();
}

/// `location_type` of a stop point (or platform)
pub const LOCATION_STOP_POINT: i32 = 0;
/// `location_type` of a station
pub const LOCATION_STATION: i32 = 1;
/// `location_type` of a station entrance or exit
pub const LOCATION_ENTRANCE: i32 = 2;
/// `location_type` of a generic node
pub const LOCATION_GENERIC_NODE: i32 = 3;
/// `location_type` of a boarding area
pub const LOCATION_BOARDING_AREA: i32 = 4;

/// A physical stop, station or area. See <https://gtfs.org/reference/static/#stopstxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Identifier, referenced by stop times, transfers and pathways
    #[serde(rename = "stop_id")]
    pub id: String,
    /// Code shown to riders
    #[serde(rename = "stop_code")]
    pub code: Opt<String>,
    /// Required for stop points, stations and entrances
    #[serde(rename = "stop_name")]
    pub name: Opt<String>,
    /// Free text completing the name
    #[serde(rename = "stop_desc")]
    pub description: Opt<String>,
    /// Latitude of the stop
    #[serde(rename = "stop_lat")]
    pub latitude: Opt<f64>,
    /// Longitude of the stop
    #[serde(rename = "stop_lon")]
    pub longitude: Opt<f64>,
    /// Identifies the fare zone for a stop
    pub zone_id: Opt<String>,
    /// Web page about the stop
    #[serde(rename = "stop_url")]
    pub url: Opt<String>,
    /// Type of the location, see the `LOCATION_*` constants. Absent means a stop point
    pub location_type: Opt<i32>,
    /// Defines hierarchy between the different locations
    pub parent_station: Opt<String>,
    /// Overrides the agency timezone
    #[serde(rename = "stop_timezone")]
    pub timezone: Opt<String>,
    /// Indicates whether wheelchair boardings are possible from the location
    pub wheelchair_boarding: Opt<i32>,
    /// [Level] within the station
    pub level_id: Opt<String>,
    /// Platform name, without the word "platform"
    pub platform_code: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static STOP_FIELDS: &[FieldDef<Stop>] = &[
    field!(Stop, "stop_id", id).required(),
    field!(Stop, "stop_code", code),
    field!(Stop, "stop_name", name),
    field!(Stop, "stop_desc", description),
    field!(Stop, "stop_lat", latitude).range(LATITUDE.0, LATITUDE.1),
    field!(Stop, "stop_lon", longitude).range(LONGITUDE.0, LONGITUDE.1),
    field!(Stop, "zone_id", zone_id),
    field!(Stop, "stop_url", url),
    field!(Stop, "location_type", location_type).allowed(&[0, 1, 2, 3, 4]),
    field!(Stop, "parent_station", parent_station).references("stops.txt"),
    field!(Stop, "stop_timezone", timezone),
    field!(Stop, "wheelchair_boarding", wheelchair_boarding).allowed(&[0, 1, 2]),
    field!(Stop, "level_id", level_id).references("levels.txt"),
    field!(Stop, "platform_code", platform_code),
];

impl Stop {
    /// `location_type`, defaulting to a stop point
    pub fn location_type(&self) -> i32 {
        self.location_type.unwrap_or(LOCATION_STOP_POINT)
    }

    /// (longitude, latitude) when both are given
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some(((*self.longitude)?, (*self.latitude)?))
    }
}

impl Record for Stop {
    const COLLECTION: &'static str = "stops.txt";
    const ID_COLUMN: Option<&'static str> = Some("stop_id");

    fn fields() -> &'static [FieldDef<Self>] {
        STOP_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        let location_type = self.location_type();
        if location_type <= LOCATION_ENTRANCE {
            if !self.name.is_present() {
                errors.push(EntityError::required("stop_name"));
            }
            if !self.latitude.is_present() {
                errors.push(EntityError::required("stop_lat"));
            }
            if !self.longitude.is_present() {
                errors.push(EntityError::required("stop_lon"));
            }
        }
        match location_type {
            LOCATION_STATION if self.parent_station.is_present() => {
                errors.push(EntityError::invalid_field(
                    "parent_station",
                    self.parent_station.as_str(),
                    "a station cannot have a parent station",
                ))
            }
            LOCATION_ENTRANCE | LOCATION_GENERIC_NODE | LOCATION_BOARDING_AREA
                if !self.parent_station.is_present() =>
            {
                errors.push(EntityError::required("parent_station"))
            }
            _ => {}
        }
        if self.parent_station.as_deref() == Some(self.id.as_str()) {
            errors.push(EntityError::invalid_field(
                "parent_station",
                &self.id,
                "a stop cannot be its own parent",
            ));
        }
    }

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if self.name.is_present() && self.name.0 == self.description.0 {
            warnings.push(EntityError::warning(
                Some("stop_desc"),
                "stop_desc should not be a copy of stop_name",
            ));
        }
        if self.coordinates() == Some((0.0, 0.0)) {
            warnings.push(EntityError::warning(
                Some("stop_lat"),
                "stop is located at (0, 0)",
            ));
        }
    }
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name.as_str())
    }
}

/// One point of the path of a [Trip]. All the points of a path share the identifier. See <https://gtfs.org/reference/static/#shapestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Identifier of the whole path
    #[serde(rename = "shape_id")]
    pub id: String,
    #[serde(rename = "shape_pt_lat")]
    /// WGS84
    pub latitude: f64,
    /// WGS84
    #[serde(rename = "shape_pt_lon")]
    pub longitude: f64,
    /// Position of the point along the path
    #[serde(rename = "shape_pt_sequence")]
    pub sequence: u32,
    /// Distance since the first point, in any unit as long as stop times use the same
    #[serde(rename = "shape_dist_traveled")]
    pub dist_traveled: Opt<f64>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static SHAPE_FIELDS: &[FieldDef<Shape>] = &[
    field!(Shape, "shape_id", id).required(),
    field!(Shape, "shape_pt_lat", latitude)
        .required()
        .range(LATITUDE.0, LATITUDE.1),
    field!(Shape, "shape_pt_lon", longitude)
        .required()
        .range(LONGITUDE.0, LONGITUDE.1),
    field!(Shape, "shape_pt_sequence", sequence).required(),
    field!(Shape, "shape_dist_traveled", dist_traveled).range(0.0, f64::MAX),
];

impl Record for Shape {
    const COLLECTION: &'static str = "shapes.txt";
    const ID_COLUMN: Option<&'static str> = Some("shape_id");

    fn fields() -> &'static [FieldDef<Self>] {
        SHAPE_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();
}

/// Weekly service over a date range. See <https://gtfs.org/reference/static/#calendartxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    /// The `service_id` trips refer to
    #[serde(rename = "service_id")]
    pub id: String,
    /// Does the service run on mondays
    pub monday: bool,
    /// Does the service run on tuesdays
    pub tuesday: bool,
    /// Does the service run on wednesdays
    pub wednesday: bool,
    /// Does the service run on thursdays
    pub thursday: bool,
    /// Does the service run on fridays
    pub friday: bool,
    /// Does the service run on saturdays
    pub saturday: bool,
    /// Does the service run on sundays
    pub sunday: bool,
    /// First day of service
    pub start_date: Opt<NaiveDate>,
    /// Last day of service, included
    pub end_date: Opt<NaiveDate>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static CALENDAR_FIELDS: &[FieldDef<Calendar>] = &[
    field!(Calendar, "service_id", id).required(),
    field!(Calendar, "monday", monday).required(),
    field!(Calendar, "tuesday", tuesday).required(),
    field!(Calendar, "wednesday", wednesday).required(),
    field!(Calendar, "thursday", thursday).required(),
    field!(Calendar, "friday", friday).required(),
    field!(Calendar, "saturday", saturday).required(),
    field!(Calendar, "sunday", sunday).required(),
    field!(Calendar, "start_date", start_date).required(),
    field!(Calendar, "end_date", end_date).required(),
];

impl Calendar {
    /// Whether the weekday of `date` runs, regardless of the range
    pub fn valid_weekday(&self, date: NaiveDate) -> bool {
        self.runs_on(date.weekday())
    }

    /// Flag of the given weekday
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// Sets the flag of the given weekday
    pub fn set_runs_on(&mut self, weekday: Weekday, runs: bool) {
        let flag = match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        };
        *flag = runs;
    }
}

impl Record for Calendar {
    const COLLECTION: &'static str = "calendar.txt";
    const ID_COLUMN: Option<&'static str> = Some("service_id");

    fn fields() -> &'static [FieldDef<Self>] {
        CALENDAR_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if let (Some(start), Some(end)) = (self.start_date.get(), self.end_date.get()) {
            if end < start {
                errors.push(EntityError::invalid_field(
                    "end_date",
                    &end.format("%Y%m%d").to_string(),
                    "ends before start_date",
                ));
            }
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}—{:?}", self.start_date, self.end_date)
    }
}

/// `exception_type` of a date added to a service
pub const EXCEPTION_ADDED: i32 = 1;
/// `exception_type` of a date removed from a service
pub const EXCEPTION_DELETED: i32 = 2;

/// Defines a specific date that can be added or removed from a [Calendar]. See <https://gtfs.org/reference/static/#calendar_datestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarDate {
    /// Identifier of the service that is modified at this date
    pub service_id: String,
    /// Date where the service will be added or deleted
    pub date: Opt<NaiveDate>,
    /// Is the service added or deleted
    pub exception_type: i32,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static CALENDAR_DATE_FIELDS: &[FieldDef<CalendarDate>] = &[
    field!(CalendarDate, "service_id", service_id)
        .required()
        .references("calendar.txt"),
    field!(CalendarDate, "date", date).required(),
    field!(CalendarDate, "exception_type", exception_type)
        .required()
        .allowed(&[1, 2]),
];

impl Record for CalendarDate {
    const COLLECTION: &'static str = "calendar_dates.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        CALENDAR_DATE_FIELDS
    }

    meta_accessors!();
}

/// A group of routes, as in the fares v2 `networks.txt`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Referenced by [Route::network_id]
    #[serde(rename = "network_id")]
    pub id: String,
    /// Name shown to riders
    #[serde(rename = "network_name")]
    pub name: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static NETWORK_FIELDS: &[FieldDef<Network>] = &[
    field!(Network, "network_id", id).required(),
    field!(Network, "network_name", name),
];

impl Record for Network {
    const COLLECTION: &'static str = "networks.txt";
    const ID_COLUMN: Option<&'static str> = Some("network_id");

    fn fields() -> &'static [FieldDef<Self>] {
        NETWORK_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();
}

const CONTINUOUS: &[i64] = &[0, 1, 2, 3];

/// A route is a commercial line (there can be various stop sequences for a same line). See <https://gtfs.org/reference/static/#routestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Identifier, referenced by trips and fare rules
    #[serde(rename = "route_id")]
    pub id: String,
    /// Agency for the specified route
    pub agency_id: Opt<String>,
    /// "32", "100X", "Green"
    #[serde(rename = "route_short_name")]
    pub short_name: Opt<String>,
    /// Descriptive name, often with the destinations
    #[serde(rename = "route_long_name")]
    pub long_name: Opt<String>,
    /// Free text about the service
    #[serde(rename = "route_desc")]
    pub desc: Opt<String>,
    /// Indicates the type of transportation used on a route. Basic (0 to 12) and extended (100 to 1799) types are accepted
    pub route_type: i32,
    /// Web page about the route
    #[serde(rename = "route_url")]
    pub url: Opt<String>,
    /// Background colour on signage
    #[serde(rename = "route_color")]
    pub color: Opt<Color>,
    /// Legible color to use for text drawn against a background of [Route::color]
    #[serde(rename = "route_text_color")]
    pub text_color: Opt<Color>,
    /// Smaller values are displayed first
    #[serde(rename = "route_sort_order")]
    pub order: Opt<u32>,
    /// Default for the stop times of the route
    pub continuous_pickup: Opt<i32>,
    /// Default for the stop times of the route
    pub continuous_drop_off: Opt<i32>,
    /// [Network] the route belongs to
    pub network_id: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static ROUTE_FIELDS: &[FieldDef<Route>] = &[
    field!(Route, "route_id", id).required(),
    field!(Route, "agency_id", agency_id).references("agency.txt"),
    field!(Route, "route_short_name", short_name),
    field!(Route, "route_long_name", long_name),
    field!(Route, "route_desc", desc),
    field!(Route, "route_type", route_type)
        .required()
        .range(0.0, 1799.0),
    field!(Route, "route_url", url),
    field!(Route, "route_color", color),
    field!(Route, "route_text_color", text_color),
    field!(Route, "route_sort_order", order),
    field!(Route, "continuous_pickup", continuous_pickup).allowed(CONTINUOUS),
    field!(Route, "continuous_drop_off", continuous_drop_off).allowed(CONTINUOUS),
    field!(Route, "network_id", network_id).references("networks.txt"),
];

impl Record for Route {
    const COLLECTION: &'static str = "routes.txt";
    const ID_COLUMN: Option<&'static str> = Some("route_id");

    fn fields() -> &'static [FieldDef<Self>] {
        ROUTE_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if !self.short_name.is_present() && !self.long_name.is_present() {
            errors.push(EntityError::required("route_short_name"));
        }
        if (13..100).contains(&self.route_type) {
            errors.push(EntityError::enumeration(
                "route_type",
                &self.route_type.to_string(),
                &[0, 1, 2, 3, 4, 5, 6, 7, 11, 12],
            ));
        }
    }

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if self.color.is_present() && self.color == self.text_color {
            warnings.push(EntityError::warning(
                Some("route_text_color"),
                "text color is the same as the route color",
            ));
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.long_name.is_present() {
            write!(f, "{}", self.long_name.as_str())
        } else {
            write!(f, "{}", self.short_name.as_str())
        }
    }
}

const AVAILABILITY: &[i64] = &[0, 1, 2];

/// One run of a vehicle along a [Route]. See <https://gtfs.org/reference/static/#tripstxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// The [Route] run
    pub route_id: String,
    /// The [Calendar] (or calendar dates) giving the days of the trip
    pub service_id: String,
    /// Identifier, referenced by stop times and frequencies
    #[serde(rename = "trip_id")]
    pub id: String,
    /// Destination shown to riders
    pub trip_headsign: Opt<String>,
    /// Train number and the like
    pub trip_short_name: Opt<String>,
    /// Indicates the direction of travel for a trip, 0 or 1
    pub direction_id: Opt<i32>,
    /// Trips sharing a block are run by the same vehicle one after the other
    pub block_id: Opt<String>,
    /// The [Shape] points of the path
    pub shape_id: Opt<String>,
    /// Indicates wheelchair accessibility
    pub wheelchair_accessible: Opt<i32>,
    /// Indicates whether bikes are allowed
    pub bikes_allowed: Opt<i32>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static TRIP_FIELDS: &[FieldDef<Trip>] = &[
    field!(Trip, "route_id", route_id)
        .required()
        .references("routes.txt"),
    field!(Trip, "service_id", service_id)
        .required()
        .references("calendar.txt"),
    field!(Trip, "trip_id", id).required(),
    field!(Trip, "trip_headsign", trip_headsign),
    field!(Trip, "trip_short_name", trip_short_name),
    field!(Trip, "direction_id", direction_id).allowed(&[0, 1]),
    field!(Trip, "block_id", block_id),
    field!(Trip, "shape_id", shape_id).references("shapes.txt"),
    field!(Trip, "wheelchair_accessible", wheelchair_accessible).allowed(AVAILABILITY),
    field!(Trip, "bikes_allowed", bikes_allowed).allowed(AVAILABILITY),
];

impl Record for Trip {
    const COLLECTION: &'static str = "trips.txt";
    const ID_COLUMN: Option<&'static str> = Some("trip_id");

    fn fields() -> &'static [FieldDef<Self>] {
        TRIP_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();
}

impl fmt::Display for Trip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "route id: {}, service id: {}",
            self.route_id, self.service_id
        )
    }
}

/// The moment where a vehicle, running on [Trip] stops at a [Stop]. See <https://gtfs.org/reference/static/#stopstimestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    /// The [Trip] stopping
    pub trip_id: String,
    /// Absent on intermediate stops whose time is interpolated
    pub arrival_time: Opt<Seconds>,
    /// Absent on intermediate stops whose time is interpolated
    pub departure_time: Opt<Seconds>,
    /// The [Stop] served
    pub stop_id: String,
    /// Position in the trip, increasing but not necessarily consecutive
    pub stop_sequence: u32,
    /// Destination shown from this stop on, when it differs from the trip's
    pub stop_headsign: Opt<String>,
    /// How riders board
    pub pickup_type: Opt<i32>,
    /// How riders alight
    pub drop_off_type: Opt<i32>,
    /// Boarding between this stop and the next one
    pub continuous_pickup: Opt<i32>,
    /// Alighting between this stop and the next one
    pub continuous_drop_off: Opt<i32>,
    /// Distance along the shape since the first stop, in the unit of the shape
    pub shape_dist_traveled: Opt<f64>,
    /// 1 when the times are exact, 0 when approximate
    pub timepoint: Opt<i32>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static STOP_TIME_FIELDS: &[FieldDef<StopTime>] = &[
    field!(StopTime, "trip_id", trip_id)
        .required()
        .references("trips.txt"),
    field!(StopTime, "arrival_time", arrival_time),
    field!(StopTime, "departure_time", departure_time),
    field!(StopTime, "stop_id", stop_id)
        .required()
        .references("stops.txt"),
    field!(StopTime, "stop_sequence", stop_sequence).required(),
    field!(StopTime, "stop_headsign", stop_headsign),
    field!(StopTime, "pickup_type", pickup_type).allowed(CONTINUOUS),
    field!(StopTime, "drop_off_type", drop_off_type).allowed(CONTINUOUS),
    field!(StopTime, "continuous_pickup", continuous_pickup).allowed(CONTINUOUS),
    field!(StopTime, "continuous_drop_off", continuous_drop_off).allowed(CONTINUOUS),
    field!(StopTime, "shape_dist_traveled", shape_dist_traveled).range(0.0, f64::MAX),
    field!(StopTime, "timepoint", timepoint).allowed(&[0, 1]),
];

impl Record for StopTime {
    const COLLECTION: &'static str = "stop_times.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        STOP_TIME_FIELDS
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if let (Some(arrival), Some(departure)) =
            (self.arrival_time.get(), self.departure_time.get())
        {
            if departure < arrival {
                errors.push(EntityError::invalid_field(
                    "departure_time",
                    &departure.to_string(),
                    "departs before arriving",
                ));
            }
        }
        if self.timepoint.0 == Some(1)
            && !(self.arrival_time.is_present() && self.departure_time.is_present())
        {
            errors.push(EntityError::required("arrival_time"));
        }
    }
}

/// Headway based service of a trip. See <https://gtfs.org/reference/static/#frequenciestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    /// The [Trip] repeated
    pub trip_id: String,
    /// First departure of the interval
    pub start_time: Seconds,
    /// End of the interval, exclusive
    pub end_time: Seconds,
    /// Seconds between two departures
    pub headway_secs: u32,
    /// 1 when departures follow the headway exactly
    pub exact_times: Opt<i32>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static FREQUENCY_FIELDS: &[FieldDef<Frequency>] = &[
    field!(Frequency, "trip_id", trip_id)
        .required()
        .references("trips.txt"),
    field!(Frequency, "start_time", start_time).required(),
    field!(Frequency, "end_time", end_time).required(),
    field!(Frequency, "headway_secs", headway_secs)
        .required()
        .range(1.0, 86400.0),
    field!(Frequency, "exact_times", exact_times).allowed(&[0, 1]),
];

impl Record for Frequency {
    const COLLECTION: &'static str = "frequencies.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        FREQUENCY_FIELDS
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if self.end_time <= self.start_time {
            errors.push(EntityError::invalid_field(
                "end_time",
                &self.end_time.to_string(),
                "must be after start_time",
            ));
        }
    }
}

/// Transfer information between stops, routes or trips. See <https://gtfs.org/reference/static/#transferstxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Where the transfer starts
    pub from_stop_id: Opt<String>,
    /// Where the transfer ends
    pub to_stop_id: Opt<String>,
    /// Narrows the transfer to the arriving route
    pub from_route_id: Opt<String>,
    /// Narrows the transfer to the departing route
    pub to_route_id: Opt<String>,
    /// Narrows the transfer to the arriving trip
    pub from_trip_id: Opt<String>,
    /// Narrows the transfer to the departing trip
    pub to_trip_id: Opt<String>,
    /// Type of the transfer, absent means recommended (0)
    pub transfer_type: Opt<i32>,
    /// Seconds needed for the transfer
    pub min_transfer_time: Opt<u32>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static TRANSFER_FIELDS: &[FieldDef<Transfer>] = &[
    field!(Transfer, "from_stop_id", from_stop_id).references("stops.txt"),
    field!(Transfer, "to_stop_id", to_stop_id).references("stops.txt"),
    field!(Transfer, "from_route_id", from_route_id).references("routes.txt"),
    field!(Transfer, "to_route_id", to_route_id).references("routes.txt"),
    field!(Transfer, "from_trip_id", from_trip_id).references("trips.txt"),
    field!(Transfer, "to_trip_id", to_trip_id).references("trips.txt"),
    field!(Transfer, "transfer_type", transfer_type).allowed(&[0, 1, 2, 3, 4, 5]),
    field!(Transfer, "min_transfer_time", min_transfer_time),
];

impl Record for Transfer {
    const COLLECTION: &'static str = "transfers.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        TRANSFER_FIELDS
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        let transfer_type = self.transfer_type.unwrap_or(0);
        if transfer_type <= 3 {
            if !self.from_stop_id.is_present() {
                errors.push(EntityError::required("from_stop_id"));
            }
            if !self.to_stop_id.is_present() {
                errors.push(EntityError::required("to_stop_id"));
            }
        } else {
            if !self.from_trip_id.is_present() {
                errors.push(EntityError::required("from_trip_id"));
            }
            if !self.to_trip_id.is_present() {
                errors.push(EntityError::required("to_trip_id"));
            }
        }
    }

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if self.transfer_type.0 == Some(2) && !self.min_transfer_time.is_present() {
            warnings.push(EntityError::warning(
                Some("min_transfer_time"),
                "a timed transfer should give its minimum transfer time",
            ));
        }
    }
}

/// Pathways linking together locations within stations. See <https://gtfs.org/reference/static/#pathwaystxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    /// Identifier of the pathway
    #[serde(rename = "pathway_id")]
    pub id: String,
    /// Origin [Stop]
    pub from_stop_id: String,
    /// Destination [Stop]
    pub to_stop_id: String,
    /// Walkway, stairs, escalator…
    #[serde(rename = "pathway_mode")]
    pub mode: i32,
    /// 1 when it can be used both ways
    pub is_bidirectional: i32,
    /// Metres
    pub length: Opt<f64>,
    /// Seconds
    pub traversal_time: Opt<u32>,
    /// Negative when going down
    pub stair_count: Opt<i32>,
    /// Ratio, negative when going down
    pub max_slope: Opt<f64>,
    /// Metres
    pub min_width: Opt<f64>,
    /// Signage text, origin to destination
    pub signposted_as: Opt<String>,
    /// Signage text, destination to origin
    pub reversed_signposted_as: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static PATHWAY_FIELDS: &[FieldDef<Pathway>] = &[
    field!(Pathway, "pathway_id", id).required(),
    field!(Pathway, "from_stop_id", from_stop_id)
        .required()
        .references("stops.txt"),
    field!(Pathway, "to_stop_id", to_stop_id)
        .required()
        .references("stops.txt"),
    field!(Pathway, "pathway_mode", mode)
        .required()
        .allowed(&[1, 2, 3, 4, 5, 6, 7]),
    field!(Pathway, "is_bidirectional", is_bidirectional)
        .required()
        .allowed(&[0, 1]),
    field!(Pathway, "length", length).range(0.0, f64::MAX),
    field!(Pathway, "traversal_time", traversal_time).range(1.0, f64::MAX),
    field!(Pathway, "stair_count", stair_count),
    field!(Pathway, "max_slope", max_slope),
    field!(Pathway, "min_width", min_width).range(0.0, f64::MAX),
    field!(Pathway, "signposted_as", signposted_as),
    field!(Pathway, "reversed_signposted_as", reversed_signposted_as),
];

impl Record for Pathway {
    const COLLECTION: &'static str = "pathways.txt";
    const ID_COLUMN: Option<&'static str> = Some("pathway_id");

    fn fields() -> &'static [FieldDef<Self>] {
        PATHWAY_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check_warnings(&self, warnings: &mut Vec<EntityError>) {
        if self.from_stop_id == self.to_stop_id {
            warnings.push(EntityError::warning(
                Some("to_stop_id"),
                "pathway starts and ends at the same location",
            ));
        }
    }
}

/// A Fare Attribute. See <https://gtfs.org/reference/static/#fare_attributestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FareAttribute {
    /// Identifier of the fare class
    #[serde(rename = "fare_id")]
    pub id: String,
    /// Fare price, in the unit specified by [FareAttribute::currency]. Kept as written in the feed
    pub price: String,
    /// Currency used to pay the fare.
    #[serde(rename = "currency_type")]
    pub currency: String,
    /// 0 when paid on board, 1 before boarding
    pub payment_method: i32,
    /// Indicates the number of transfers permitted on this fare, absent means unlimited
    pub transfers: Opt<i32>,
    /// Identifies the relevant agency for a fare
    pub agency_id: Opt<String>,
    /// Seconds a transfer stays valid
    pub transfer_duration: Opt<u32>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static FARE_ATTRIBUTE_FIELDS: &[FieldDef<FareAttribute>] = &[
    field!(FareAttribute, "fare_id", id).required(),
    field!(FareAttribute, "price", price).required(),
    field!(FareAttribute, "currency_type", currency).required(),
    field!(FareAttribute, "payment_method", payment_method)
        .required()
        .allowed(&[0, 1]),
    field!(FareAttribute, "transfers", transfers).allowed(&[0, 1, 2]),
    field!(FareAttribute, "agency_id", agency_id).references("agency.txt"),
    field!(FareAttribute, "transfer_duration", transfer_duration),
];

impl Record for FareAttribute {
    const COLLECTION: &'static str = "fare_attributes.txt";
    const ID_COLUMN: Option<&'static str> = Some("fare_id");

    fn fields() -> &'static [FieldDef<Self>] {
        FARE_ATTRIBUTE_FIELDS
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn set_entity_id(&mut self, id: String) {
        self.id = id;
    }

    meta_accessors!();

    fn check(&self, errors: &mut Vec<EntityError>) {
        if self.price.is_empty() {
            return;
        }
        match self.price.parse::<f64>() {
            Ok(p) if p >= 0.0 => {}
            _ => errors.push(EntityError::invalid_field(
                "price",
                &self.price,
                "must be a non-negative number",
            )),
        }
        if self.currency.len() != 3 && !self.currency.is_empty() {
            errors.push(EntityError::invalid_field(
                "currency_type",
                &self.currency,
                "must be an ISO 4217 currency code",
            ));
        }
    }
}

/// Defines one possible fare. See <https://gtfs.org/reference/static/#fare_rulestxt>
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FareRule {
    /// ID of the referenced FareAttribute.
    pub fare_id: String,
    /// ID of a [Route] associated with the fare class
    pub route_id: Opt<String>,
    /// Identifies an origin zone
    pub origin_id: Opt<String>,
    /// Identifies an destination zone
    pub destination_id: Opt<String>,
    /// Identifies the zones that a rider will enter while using a given fare class
    pub contains_id: Opt<String>,
    /// Source line, unknown columns and load errors
    #[serde(skip)]
    pub meta: Meta,
}

static FARE_RULE_FIELDS: &[FieldDef<FareRule>] = &[
    field!(FareRule, "fare_id", fare_id)
        .required()
        .references("fare_attributes.txt"),
    field!(FareRule, "route_id", route_id).references("routes.txt"),
    field!(FareRule, "origin_id", origin_id),
    field!(FareRule, "destination_id", destination_id),
    field!(FareRule, "contains_id", contains_id),
];

impl Record for FareRule {
    const COLLECTION: &'static str = "fare_rules.txt";

    fn fields() -> &'static [FieldDef<Self>] {
        FARE_RULE_FIELDS
    }

    meta_accessors!();
}
