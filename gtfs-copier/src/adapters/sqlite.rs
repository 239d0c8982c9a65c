//! GTFS in a SQLite database, one table per collection.
//!
//! Every table has an `id INTEGER PRIMARY KEY AUTOINCREMENT` column, used as the new identifier of
//! the entities written, and an `_extra` column holding the unknown columns as JSON. Reference
//! columns hold the `id` of the row they point to.
use super::csv::REQUIRED_FILES;
use super::{EntityStream, Publisher, Reader, StreamOptions, Writer};
use gtfs_structures::{Entity, EntityError, EntityKind, Error, KeyMap};
use log::{debug, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const EXTRA_COLUMN: &str = "_extra";

// well below the host parameter limit of older sqlite versions
const MAX_PARAMETERS: usize = 500;

fn table_name(kind: EntityKind) -> &'static str {
    kind.collection().trim_end_matches(".txt")
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn serialization_error(kind: EntityKind, e: serde_json::Error) -> Error {
    Error::NamedFileIO {
        file_name: table_name(kind).to_owned(),
        source: Box::new(e),
    }
}

/// Writes a feed into a SQLite database. Tables are created on demand
pub struct SqliteWriter {
    path: PathBuf,
    conn: Option<Connection>,
    created: FxHashSet<EntityKind>,
    inserts: FxHashMap<EntityKind, String>,
}

impl SqliteWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        Ok(Self {
            path,
            conn: Some(conn),
            created: FxHashSet::default(),
            inserts: FxHashMap::default(),
        })
    }

    fn connection(&mut self) -> Result<&mut Connection, Error> {
        if self.conn.is_none() {
            self.conn = Some(Connection::open(&self.path)?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Task(format!("{} is closed", self.path.display())))
    }

    fn create_table(&mut self, kind: EntityKind) -> Result<(), Error> {
        if self.created.contains(&kind) {
            return Ok(());
        }
        let table = table_name(kind);
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned()];
        columns.extend(kind.columns().iter().map(|c| format!("\"{}\"", c)));
        columns.push(format!("{} TEXT", EXTRA_COLUMN));
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
                table,
                columns.join(", ")
            ),
            (),
        )?;
        if kind == EntityKind::StopTime {
            conn.execute(
                "CREATE INDEX IF NOT EXISTS stop_times_trip_id ON stop_times (trip_id)",
                (),
            )?;
        }
        let names: Vec<String> = kind
            .columns()
            .iter()
            .map(|c| format!("\"{}\"", c))
            .chain(std::iter::once(EXTRA_COLUMN.to_owned()))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        self.inserts.insert(
            kind,
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders.join(", ")
            ),
        );
        self.created.insert(kind);
        Ok(())
    }

    fn insert(conn: &Connection, sql: &str, entity: &Entity) -> Result<String, Error> {
        let mut values = entity.sql_row();
        let extra = &entity.meta().extra;
        values.push(if extra.is_empty() {
            rusqlite::types::Value::Null
        } else {
            let json =
                serde_json::to_string(extra).map_err(|e| serialization_error(entity.kind(), e))?;
            rusqlite::types::Value::Text(json)
        });
        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute(params_from_iter(values))?;
        Ok(conn.last_insert_rowid().to_string())
    }

    fn insert_sql(&mut self, kind: EntityKind) -> Result<String, Error> {
        self.create_table(kind)?;
        self.inserts
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Task(format!("no table for {}", kind)))
    }
}

impl Writer for SqliteWriter {
    fn create(&mut self) -> Result<(), Error> {
        for kind in EntityKind::ALL {
            self.create_table(*kind)?;
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<(), Error> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        self.created.clear();
        self.inserts.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn add_entity(&mut self, entity: &Entity) -> Result<String, Error> {
        let sql = self.insert_sql(entity.kind())?;
        let conn = self.connection()?;
        Self::insert(conn, &sql, entity)
    }

    /// One transaction for the whole slice
    fn add_entities(&mut self, entities: &[Entity]) -> Result<Vec<String>, Error> {
        let mut kinds: Vec<EntityKind> = entities.iter().map(Entity::kind).collect();
        kinds.dedup();
        let mut statements = FxHashMap::default();
        for kind in kinds {
            statements.insert(kind, self.insert_sql(kind)?);
        }
        let conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let sql = statements
                .get(&entity.kind())
                .ok_or_else(|| Error::Task(format!("no table for {}", entity.kind())))?;
            ids.push(Self::insert(&tx, sql, entity)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn new_reader(&mut self) -> Result<Box<dyn Reader>, Error> {
        Ok(Box::new(SqliteReader::open(&self.path)?))
    }

    fn close(&mut self) -> Result<(), Error> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
            info!("feed written in {}", self.path.display());
        }
        Ok(())
    }
}

type Naturals = Arc<FxHashMap<String, String>>;

// row id -> natural identifier, per collection
struct NaturalIds(FxHashMap<&'static str, Naturals>);

impl KeyMap for NaturalIds {
    fn get(&self, collection: &str, old_id: &str) -> Option<&str> {
        self.0
            .get(collection)
            .and_then(|ids| ids.get(old_id))
            .map(String::as_str)
    }
}

/// Which rows of a table a stream reads. Trips are given by row id
enum Rows {
    All,
    OfTrips(Vec<String>),
    NotOfTrips(FxHashSet<String>),
}

/// Reads a feed written by [SqliteWriter]: references are turned back into natural identifiers.
///
/// Every stream opens its own read only connection.
#[derive(Clone)]
pub struct SqliteReader {
    path: PathBuf,
    naturals: Arc<Mutex<FxHashMap<&'static str, Naturals>>>,
}

impl SqliteReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::NotFileNorDirectory(format!("{}", path.display())));
        }
        let reader = Self {
            path,
            naturals: Arc::default(),
        };
        let _conn = reader.connect()?;
        Ok(reader)
    }

    fn connect(&self) -> Result<Connection, Error> {
        Ok(Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    fn has_table(&self, kind: EntityKind) -> Result<bool, Error> {
        Ok(!table_columns(&self.connect()?, table_name(kind))?.is_empty())
    }

    /// Natural identifier of every row of a collection, loaded once
    fn naturals(&self, conn: &Connection, collection: &'static str) -> Result<Naturals, Error> {
        let cache = self
            .naturals
            .lock()
            .map_err(|_| Error::Task("identifier cache poisoned".to_owned()))?
            .get(collection)
            .cloned();
        if let Some(ids) = cache {
            return Ok(ids);
        }
        let mut ids = FxHashMap::default();
        let kind = EntityKind::from_collection(collection)
            .ok_or_else(|| Error::UnknownCollection(collection.to_owned()))?;
        let table = table_name(kind);
        if let Some(id_column) = kind.id_column() {
            if !table_columns(conn, table)?.is_empty() {
                // shapes have one row per point, references point to the first one
                let mut stmt = conn.prepare(&format!(
                    "SELECT min(id), \"{col}\" FROM \"{table}\" GROUP BY \"{col}\"",
                    col = id_column,
                    table = table
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
                })?;
                for row in rows {
                    let (rowid, natural) = row?;
                    ids.insert(rowid.to_string(), natural.unwrap_or_default());
                }
            }
        }
        let ids = Arc::new(ids);
        self.naturals
            .lock()
            .map_err(|_| Error::Task("identifier cache poisoned".to_owned()))?
            .insert(collection, ids.clone());
        Ok(ids)
    }

    fn trip_rowids(&self, trip_ids: &[String]) -> Result<Vec<String>, Error> {
        let trips = self.naturals(&self.connect()?, EntityKind::Trip.collection())?;
        let wanted: FxHashSet<&str> = trip_ids.iter().map(String::as_str).collect();
        Ok(trips
            .iter()
            .filter(|(_, natural)| wanted.contains(natural.as_str()))
            .map(|(rowid, _)| rowid.clone())
            .collect())
    }

    fn produce(&self, kind: EntityKind, publisher: &Publisher, rows: Rows) -> Result<(), Error> {
        let conn = self.connect()?;
        let mut naturals = FxHashMap::default();
        for (_, target) in kind.references() {
            naturals.insert(target, self.naturals(&conn, target)?);
        }
        let naturals = NaturalIds(naturals);

        let table = table_name(kind);
        let filtered = matches!(rows, Rows::OfTrips(_));
        let (chunks, skipped): (Vec<Vec<String>>, FxHashSet<String>) = match rows {
            Rows::All => (vec![vec![]], FxHashSet::default()),
            Rows::OfTrips(ids) => (
                ids.chunks(MAX_PARAMETERS).map(<[String]>::to_vec).collect(),
                FxHashSet::default(),
            ),
            Rows::NotOfTrips(ids) => (vec![vec![]], ids),
        };
        let mut count = 0;
        for chunk in chunks {
            let sql = if filtered {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                format!(
                    "SELECT * FROM \"{}\" WHERE trip_id IN ({}) ORDER BY id",
                    table, placeholders
                )
            } else {
                format!("SELECT * FROM \"{}\" ORDER BY id", table)
            };
            let mut stmt = conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let mut values: Vec<(&str, ValueRef<'_>)> = Vec::with_capacity(names.len());
                let mut rowid = None;
                let mut extra = None;
                for (i, name) in names.iter().enumerate() {
                    match name.as_str() {
                        "id" => rowid = row.get::<_, Option<i64>>(i)?,
                        EXTRA_COLUMN => extra = row.get::<_, Option<String>>(i)?,
                        _ => values.push((name.as_str(), row.get_ref(i)?)),
                    }
                }
                let line = rowid.map(|id| id as u64);
                let mut entity = kind.load_sql(&values);
                if let Entity::StopTime(st) = &entity {
                    if skipped.contains(&st.trip_id) {
                        continue;
                    }
                }
                entity.meta_mut().line = line;
                if let Some(json) = extra {
                    match serde_json::from_str::<Vec<(String, String)>>(&json) {
                        Ok(extra) => entity.meta_mut().extra = extra,
                        Err(e) => entity
                            .meta_mut()
                            .load_errors
                            .push(EntityError::row(format!("unreadable extra columns: {}", e))),
                    }
                }
                let item = match entity.update_keys(&naturals) {
                    Ok(()) => Ok(entity),
                    Err(e) => Err(e.at_line(line)),
                };
                count += 1;
                if !publisher.publish(item) {
                    debug!("{}: consumer stopped after {} rows", table, count);
                    return Ok(());
                }
            }
        }
        debug!("{}: {} rows read", table, count);
        Ok(())
    }

    fn stream(
        &self,
        kind: EntityKind,
        options: &StreamOptions,
        rows: Rows,
    ) -> Result<Option<EntityStream>, Error> {
        if !self.has_table(kind)? {
            return Ok(None);
        }
        let reader = self.clone();
        Ok(Some(EntityStream::spawn(options, move |publisher| {
            reader.produce(kind, publisher, rows)
        })))
    }
}

impl Reader for SqliteReader {
    fn validate_structure(&self) -> Vec<Error> {
        let conn = match self.connect() {
            Ok(conn) => conn,
            Err(e) => return vec![e],
        };
        let mut errors = Vec::new();
        for kind in EntityKind::ALL {
            let collection = kind.collection();
            let columns = match table_columns(&conn, table_name(*kind)) {
                Ok(columns) => columns,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            if columns.is_empty() {
                if REQUIRED_FILES.contains(&collection) {
                    errors.push(Error::MissingFile(collection.to_owned()));
                }
                continue;
            }
            for (column, required) in kind.column_specs() {
                if required && !columns.iter().any(|c| c == column) {
                    errors.push(Error::MissingColumn {
                        file_name: collection.to_owned(),
                        column: column.to_owned(),
                    });
                }
            }
        }
        let has_calendar = |kind| table_columns(&conn, table_name(kind)).map_or(false, |c| !c.is_empty());
        if !has_calendar(EntityKind::Calendar) && !has_calendar(EntityKind::CalendarDate) {
            errors.push(Error::MissingFile("calendar.txt".to_owned()));
        }
        errors
    }

    fn read(&self, kind: EntityKind, options: &StreamOptions) -> Result<Option<EntityStream>, Error> {
        self.stream(kind, options, Rows::All)
    }

    /// Natural trip identifiers are turned into row ids, unknown ones are ignored
    fn stop_times_by_trip_ids(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        let rowids = self.trip_rowids(&trip_ids)?;
        if rowids.is_empty() {
            if !trip_ids.is_empty() {
                warn!("none of the {} trips asked are in {}", trip_ids.len(), self.path.display());
            }
            return Ok(Some(EntityStream::from_entities(options, vec![])));
        }
        self.stream(EntityKind::StopTime, options, Rows::OfTrips(rowids))
    }

    /// Rows pointing at a row id that no longer exists come out as reference errors
    fn stop_times_of_other_trips(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        let rowids = self.trip_rowids(&trip_ids)?.into_iter().collect();
        self.stream(EntityKind::StopTime, options, Rows::NotOfTrips(rowids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::{Agency, Route, Stop, StopTime, Trip};

    async fn collect(stream: Option<EntityStream>) -> Vec<Result<Entity, EntityError>> {
        let mut stream = stream.expect("no stream");
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        stream.finish().await.unwrap();
        items
    }

    fn stop(id: &str, parent: &str) -> Entity {
        Entity::Stop(Stop {
            id: id.to_owned(),
            name: "Stop".into(),
            parent_station: parent.into(),
            ..Default::default()
        })
    }

    #[test]
    fn row_ids_are_new_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SqliteWriter::open(dir.path().join("feed.db")).unwrap();
        writer.create().unwrap();
        assert_eq!("1", writer.add_entity(&stop("a", "")).unwrap());
        assert_eq!(
            vec!["2".to_owned(), "3".to_owned()],
            writer
                .add_entities(&[stop("b", "1"), stop("c", "1")])
                .unwrap()
        );
        writer.close().unwrap();
    }

    #[tokio::test]
    async fn references_read_back_as_natural_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let mut writer = SqliteWriter::open(&path).unwrap();
        writer.create().unwrap();
        let parent = writer.add_entity(&stop("station", "")).unwrap();
        let mut child = stop("platform", &parent);
        child.meta_mut().extra = vec![("platform_code".to_owned(), "2".to_owned())];
        writer.add_entity(&child).unwrap();
        writer.close().unwrap();

        let reader = SqliteReader::open(&path).unwrap();
        let stops = collect(reader.read(EntityKind::Stop, &StreamOptions::default()).unwrap()).await;
        assert_eq!(2, stops.len());
        match stops[1].as_ref().unwrap() {
            Entity::Stop(s) => {
                assert_eq!("platform", s.id);
                assert_eq!(Some("station"), s.parent_station.as_deref());
                assert_eq!(
                    vec![("platform_code".to_owned(), "2".to_owned())],
                    s.meta.extra
                );
            }
            e => panic!("not a stop: {:?}", e),
        }
    }

    #[tokio::test]
    async fn stop_times_of_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let mut writer = SqliteWriter::open(&path).unwrap();
        writer.create().unwrap();
        writer.add_entity(&Agency::default().into()).unwrap();
        let route = writer
            .add_entity(
                &Route {
                    id: "r".to_owned(),
                    route_type: 3,
                    ..Default::default()
                }
                .into(),
            )
            .unwrap();
        let stop = writer.add_entity(&stop("s", "")).unwrap();
        let mut trips = Vec::new();
        for id in ["t1", "t2"] {
            trips.push(
                writer
                    .add_entity(
                        &Trip {
                            id: id.to_owned(),
                            route_id: route.clone(),
                            ..Default::default()
                        }
                        .into(),
                    )
                    .unwrap(),
            );
        }
        let mut stop_times: Vec<Entity> = Vec::new();
        for trip in &trips {
            for sequence in 1..=2 {
                stop_times.push(
                    StopTime {
                        trip_id: trip.clone(),
                        stop_id: stop.clone(),
                        stop_sequence: sequence,
                        ..Default::default()
                    }
                    .into(),
                );
            }
        }
        writer.add_entities(&stop_times).unwrap();
        writer.close().unwrap();

        let reader = SqliteReader::open(&path).unwrap();
        let items = collect(
            reader
                .stop_times_by_trip_ids(vec!["t2".to_owned()], &StreamOptions::default())
                .unwrap(),
        )
        .await;
        assert_eq!(2, items.len());
        for item in items {
            match item.unwrap() {
                Entity::StopTime(st) => {
                    assert_eq!("t2", st.trip_id);
                    assert_eq!("s", st.stop_id);
                }
                e => panic!("not a stop time: {:?}", e),
            }
        }
        let none = collect(
            reader
                .stop_times_by_trip_ids(vec!["t9".to_owned()], &StreamOptions::default())
                .unwrap(),
        )
        .await;
        assert!(none.is_empty());
        let others = collect(
            reader
                .stop_times_of_other_trips(vec!["t2".to_owned()], &StreamOptions::default())
                .unwrap(),
        )
        .await;
        assert_eq!(2, others.len());
        for item in others {
            match item.unwrap() {
                Entity::StopTime(st) => assert_eq!("t1", st.trip_id),
                e => panic!("not a stop time: {:?}", e),
            }
        }
    }

    #[test]
    fn structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let mut writer = SqliteWriter::open(&path).unwrap();
        writer.create().unwrap();
        writer.close().unwrap();
        assert!(SqliteReader::open(&path).unwrap().validate_structure().is_empty());

        let empty = dir.path().join("empty.db");
        Connection::open(&empty)
            .unwrap()
            .execute("CREATE TABLE other (x)", ())
            .unwrap();
        let errors = SqliteReader::open(&empty).unwrap().validate_structure();
        assert!(errors.iter().any(|e| matches!(e, Error::MissingFile(f) if f == "stops.txt")));
        assert!(matches!(
            SqliteReader::open(dir.path().join("nothing.db")),
            Err(Error::NotFileNorDirectory(_))
        ));
    }

    #[test]
    fn delete_removes_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let mut writer = SqliteWriter::open(&path).unwrap();
        writer.create().unwrap();
        writer.delete().unwrap();
        assert!(!path.exists());
    }
}
