//! GTFS as a directory of CSV files or a zip archive
use super::{EntityStream, Publisher, Reader, StreamOptions};
use gtfs_structures::{ColumnMap, EntityError, EntityKind, Error};
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Chain, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files a feed cannot do without. A feed also needs `calendar.txt` or `calendar_dates.txt`
pub const REQUIRED_FILES: &[&str] = &[
    "agency.txt",
    "stops.txt",
    "routes.txt",
    "trips.txt",
    "stop_times.txt",
];

const BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

#[derive(Debug)]
enum Source {
    Directory(PathBuf),
    Zip {
        path: PathBuf,
        // file name (without any directory) -> index in the archive
        files: FxHashMap<String, usize>,
        sha256: String,
    },
}

/// Reads a feed from a directory or a zip archive.
///
/// Cloning is cheap: every stream works on its own clone from a blocking thread.
#[derive(Debug, Clone)]
pub struct CsvReader {
    source: Arc<Source>,
    /// Trim the values, on by default. It is quite time consumming
    pub trim_fields: bool,
}

impl CsvReader {
    /// Opens a local zip archive or directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let p = path.as_ref();
        let source = if p.is_file() {
            let mut hasher = Sha256::new();
            let mut file = File::open(p)?;
            let _n = std::io::copy(&mut file, &mut hasher)?;
            let hash = hasher.finalize();
            let mut archive = zip::ZipArchive::new(File::open(p)?)?;
            let mut files = FxHashMap::default();
            for i in 0..archive.len() {
                let archive_file = archive.by_index(i)?;
                let name = Path::new(archive_file.name())
                    .file_name()
                    .and_then(|f| f.to_str())
                    .map(str::to_owned);
                if let Some(name) = name {
                    files.entry(name).or_insert(i);
                }
            }
            Source::Zip {
                path: p.to_owned(),
                files,
                sha256: format!("{:x}", hash),
            }
        } else if p.is_dir() {
            Source::Directory(p.to_owned())
        } else {
            return Err(Error::NotFileNorDirectory(format!("{}", p.display())));
        };
        info!("opened feed {}", p.display());
        Ok(Self {
            source: Arc::new(source),
            trim_fields: true,
        })
    }

    /// Hash of the archive, `None` for directories
    pub fn sha256(&self) -> Option<&str> {
        match self.source.as_ref() {
            Source::Zip { sha256, .. } => Some(sha256),
            Source::Directory(_) => None,
        }
    }

    pub fn has_file(&self, file_name: &str) -> bool {
        match self.source.as_ref() {
            Source::Directory(dir) => dir.join(file_name).is_file(),
            Source::Zip { files, .. } => files.contains_key(file_name),
        }
    }

    /// Runs `f` on the content of the file, `None` if the feed does not have it
    fn with_file<R>(
        &self,
        file_name: &str,
        f: impl FnOnce(&mut dyn Read) -> Result<R, Error>,
    ) -> Result<Option<R>, Error> {
        match self.source.as_ref() {
            Source::Directory(dir) => {
                let path = dir.join(file_name);
                if !path.is_file() {
                    return Ok(None);
                }
                let mut file = File::open(path).map_err(|e| Error::NamedFileIO {
                    file_name: file_name.to_owned(),
                    source: Box::new(e),
                })?;
                f(&mut file).map(Some)
            }
            Source::Zip { path, files, .. } => {
                let Some(index) = files.get(file_name) else {
                    return Ok(None);
                };
                let mut archive = zip::ZipArchive::new(File::open(path)?)?;
                let mut file = archive.by_index(*index).map_err(|e| Error::NamedFileIO {
                    file_name: file_name.to_owned(),
                    source: Box::new(e),
                })?;
                f(&mut file).map(Some)
            }
        }
    }

    /// Reads the header of a file and maps it onto the fields of `kind`
    fn csv_reader<'r>(
        &self,
        reader: &'r mut dyn Read,
        kind: EntityKind,
    ) -> Result<(::csv::Reader<Chain<Cursor<Vec<u8>>, &'r mut dyn Read>>, ColumnMap), Error> {
        let file_name = kind.collection();
        let mut bom = [0; 3];
        let mut n = 0;
        while n < bom.len() {
            match reader.read(&mut bom[n..]) {
                Ok(0) => break,
                Ok(read) => n += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::NamedFileIO {
                        file_name: file_name.to_owned(),
                        source: Box::new(e),
                    })
                }
            }
        }
        if n == 0 {
            return Err(Error::EmptyFile(file_name.to_owned()));
        }
        // the bytes we consumed are not a BOM, put them back in front
        let prefix = if n == 3 && bom == BOM {
            Vec::new()
        } else {
            bom[..n].to_vec()
        };

        let mut csv_reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .trim(if self.trim_fields {
                ::csv::Trim::Fields
            } else {
                ::csv::Trim::None
            })
            .from_reader(Cursor::new(prefix).chain(reader));
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| Error::CSVError {
                file_name: file_name.to_owned(),
                source: e,
                line_in_error: None,
            })?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(Error::EmptyFile(file_name.to_owned()));
        }
        let columns = ColumnMap::new(file_name, &kind.column_specs(), &headers)?;
        Ok((csv_reader, columns))
    }

    /// Reads every row of the file, keeping the ones accepted by `keep`.
    ///
    /// Rows that cannot be decoded are published only with `unreadable`, so that several partial
    /// scans of a file do not report them more than once
    fn produce(
        &self,
        kind: EntityKind,
        publisher: &Publisher,
        unreadable: bool,
        keep: impl Fn(&ColumnMap, &::csv::StringRecord) -> bool,
    ) -> Result<(), Error> {
        let file_name = kind.collection();
        self.with_file(file_name, |reader| {
            let (mut csv_reader, columns) = self.csv_reader(reader, kind)?;
            // Pre-allocate a StringRecord for performance reasons
            let mut rec = ::csv::StringRecord::new();
            let mut count = 0;
            loop {
                match csv_reader.read_record(&mut rec) {
                    Ok(false) => break,
                    Ok(true) => {
                        if !keep(&columns, &rec) {
                            continue;
                        }
                        let line = rec.position().map(|p| p.line());
                        let entity = kind.load_row(&columns, rec.iter(), line);
                        count += 1;
                        if !publisher.publish(Ok(entity)) {
                            debug!("{}: consumer stopped after {} rows", file_name, count);
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        if let ::csv::ErrorKind::Utf8 { pos, err } = e.kind() {
                            if !unreadable {
                                continue;
                            }
                            let line = pos.as_ref().map(|p| p.line());
                            let error = EntityError::row(format!("invalid UTF-8: {}", err))
                                .at_line(line);
                            if !publisher.publish(Err(error)) {
                                return Ok(());
                            }
                            continue;
                        }
                        return Err(Error::CSVError {
                            file_name: file_name.to_owned(),
                            source: e,
                            line_in_error: Some(gtfs_structures::error::LineError {
                                headers: columns.headers.clone(),
                                values: rec.iter().map(String::from).collect(),
                            }),
                        });
                    }
                }
            }
            debug!("{}: {} rows read", file_name, count);
            Ok(())
        })
        .map(|_| ())
    }

    fn stream(
        &self,
        kind: EntityKind,
        options: &StreamOptions,
        unreadable: bool,
        keep: impl Fn(&ColumnMap, &::csv::StringRecord) -> bool + Send + 'static,
    ) -> Option<EntityStream> {
        if !self.has_file(kind.collection()) {
            return None;
        }
        let reader = self.clone();
        Some(EntityStream::spawn(options, move |publisher| {
            reader.produce(kind, publisher, unreadable, keep)
        }))
    }

    // stop times whose trip is (or is not) in `trip_ids`
    fn stop_times(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
        among: bool,
    ) -> Option<EntityStream> {
        let trip_ids: FxHashSet<String> = trip_ids.into_iter().collect();
        self.stream(EntityKind::StopTime, options, !among, move |columns, rec| {
            let trip_id = columns
                .headers
                .iter()
                .position(|h| h == "trip_id")
                .and_then(|i| rec.get(i))
                .map(str::trim)
                .unwrap_or_default();
            trip_ids.contains(trip_id) == among
        })
    }
}

impl Reader for CsvReader {
    fn validate_structure(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for file_name in REQUIRED_FILES {
            if !self.has_file(file_name) {
                errors.push(Error::MissingFile((*file_name).to_owned()));
            }
        }
        if !self.has_file("calendar.txt") && !self.has_file("calendar_dates.txt") {
            errors.push(Error::MissingFile("calendar.txt".to_owned()));
        }
        for kind in EntityKind::ALL {
            let checked = self.with_file(kind.collection(), |reader| {
                self.csv_reader(reader, *kind).map(|_| ())
            });
            if let Err(e) = checked {
                errors.push(e);
            }
        }
        errors
    }

    fn read(&self, kind: EntityKind, options: &StreamOptions) -> Result<Option<EntityStream>, Error> {
        Ok(self.stream(kind, options, true, |_, _| true))
    }

    /// Scans `stop_times.txt` once per call, keeping the rows of the given trips
    fn stop_times_by_trip_ids(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        Ok(self.stop_times(trip_ids, options, true))
    }

    /// The same scan, keeping the rows of the other trips. Undecodable rows are reported here
    fn stop_times_of_other_trips(
        &self,
        trip_ids: Vec<String>,
        options: &StreamOptions,
    ) -> Result<Option<EntityStream>, Error> {
        Ok(self.stop_times(trip_ids, options, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_structures::{Entity, ErrorKind};

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../gtfs-structure/fixtures/basic")
    }

    async fn collect(stream: Option<EntityStream>) -> Vec<Result<Entity, EntityError>> {
        let mut stream = stream.expect("no stream");
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        stream.finish().await.unwrap();
        items
    }

    #[tokio::test]
    async fn read_directory() {
        let reader = CsvReader::open(fixture()).unwrap();
        assert!(reader.validate_structure().is_empty());
        assert_eq!(None, reader.sha256());
        let stops = collect(reader.read(EntityKind::Stop, &StreamOptions::default()).unwrap()).await;
        assert_eq!(6, stops.len());
        assert_eq!("stop2", stops[0].as_ref().unwrap().entity_id());
        assert!(reader
            .read(EntityKind::Network, &StreamOptions::default())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn read_zip() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/zips/basic.zip");
        let reader = CsvReader::open(path).unwrap();
        assert_eq!(64, reader.sha256().unwrap().len());
        assert!(reader.validate_structure().is_empty());
        let routes = collect(reader.read(EntityKind::Route, &StreamOptions::default()).unwrap()).await;
        assert_eq!(2, routes.len());
    }

    #[tokio::test]
    async fn bulk_stop_times() {
        let reader = CsvReader::open(fixture()).unwrap();
        let stop_times = collect(
            reader
                .stop_times_by_trip_ids(vec!["trip2".to_owned()], &StreamOptions::default())
                .unwrap(),
        )
        .await;
        assert_eq!(3, stop_times.len());
        for st in stop_times {
            match st.unwrap() {
                Entity::StopTime(st) => assert_eq!("trip2", st.trip_id),
                other => panic!("unexpected {:?}", other),
            }
        }

        let others = collect(
            reader
                .stop_times_of_other_trips(vec!["trip2".to_owned()], &StreamOptions::default())
                .unwrap(),
        )
        .await;
        assert_eq!(3, others.len());
        for st in others {
            match st.unwrap() {
                Entity::StopTime(st) => assert_eq!("trip1", st.trip_id),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn undecodable_stop_times_are_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("stop_times.txt"),
            b"trip_id,stop_id,stop_sequence\nt1,s,1\nt\xff,s,2\nt2,s,1\n",
        )
        .unwrap();
        let reader = CsvReader::open(dir.path()).unwrap();
        let options = StreamOptions::default();
        let kept = collect(
            reader
                .stop_times_by_trip_ids(vec!["t1".to_owned()], &options)
                .unwrap(),
        )
        .await;
        assert_eq!(1, kept.len());
        assert!(kept[0].is_ok());
        let others = collect(
            reader
                .stop_times_of_other_trips(vec!["t1".to_owned()], &options)
                .unwrap(),
        )
        .await;
        assert_eq!(2, others.len());
        assert_eq!(ErrorKind::Row, others[0].as_ref().unwrap_err().kind);
        assert_eq!("t2", others[1].as_ref().unwrap().field_text("trip_id").unwrap_or_default());
    }

    #[tokio::test]
    async fn bom_and_spaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agency.txt"),
            b"\xef\xbb\xbfagency_id, agency_name,agency_url,agency_timezone\n a1 ,Bibus,http://bibus.fr,Europe/Paris\n",
        )
        .unwrap();
        let reader = CsvReader::open(dir.path()).unwrap();
        let agencies = collect(reader.read(EntityKind::Agency, &StreamOptions::default()).unwrap()).await;
        let agency = agencies[0].as_ref().unwrap();
        assert_eq!("a1", agency.entity_id());
        assert!(agency.errors().is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_row_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("levels.txt"),
            b"level_id,level_index\nL1,0\nL\xff,1\nL3,2\n",
        )
        .unwrap();
        let reader = CsvReader::open(dir.path()).unwrap();
        let levels = collect(reader.read(EntityKind::Level, &StreamOptions::default()).unwrap()).await;
        assert_eq!(3, levels.len());
        let error = levels[1].as_ref().unwrap_err();
        assert_eq!(ErrorKind::Row, error.kind);
        assert!(levels[2].is_ok());
    }

    #[test]
    fn structure_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agency.txt"), b"").unwrap();
        std::fs::write(dir.path().join("stops.txt"), b"stop_name,stop_name\n").unwrap();
        let reader = CsvReader::open(dir.path()).unwrap();
        let errors = reader.validate_structure();
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::MissingFile(f) if f == "trips.txt")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::EmptyFile(f) if f == "agency.txt")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::DuplicateColumn { .. })));
    }

    #[test]
    fn not_a_feed() {
        assert!(matches!(
            CsvReader::open("does/not/exist"),
            Err(Error::NotFileNorDirectory(_))
        ));
    }
}
