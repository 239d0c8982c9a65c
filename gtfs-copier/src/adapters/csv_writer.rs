use super::{CsvReader, Reader, Writer};
use gtfs_structures::{Entity, EntityKind, Error};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::path::PathBuf;

struct CollectionFile {
    writer: ::csv::Writer<File>,
    // columns unknown to the schema, taken from the first entity written
    extra_columns: Vec<String>,
    // extra columns of later entities that the header has no room for
    dropped_columns: FxHashSet<String>,
}

/// Writes a feed as a directory of CSV files.
///
/// Files are opened on the first entity of their collection. Natural identifiers are kept, so
/// the new identifier of an entity is its own.
pub struct CsvWriter {
    dir: PathBuf,
    files: FxHashMap<EntityKind, CollectionFile>,
}

impl CsvWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            files: FxHashMap::default(),
        }
    }

    fn csv_error(kind: EntityKind, source: ::csv::Error) -> Error {
        Error::CSVError {
            file_name: kind.collection().to_owned(),
            source,
            line_in_error: None,
        }
    }

    fn file(&mut self, entity: &Entity) -> Result<&mut CollectionFile, Error> {
        let kind = entity.kind();
        if !self.files.contains_key(&kind) {
            std::fs::create_dir_all(&self.dir)?;
            let path = self.dir.join(kind.collection());
            let mut writer = ::csv::Writer::from_path(&path).map_err(|e| Self::csv_error(kind, e))?;
            let extra_columns: Vec<String> =
                entity.meta().extra.iter().map(|(k, _)| k.clone()).collect();
            let mut header: Vec<&str> = kind.columns();
            header.extend(extra_columns.iter().map(String::as_str));
            writer
                .write_record(&header)
                .map_err(|e| Self::csv_error(kind, e))?;
            self.files.insert(
                kind,
                CollectionFile {
                    writer,
                    extra_columns,
                    dropped_columns: FxHashSet::default(),
                },
            );
        }
        self.files
            .get_mut(&kind)
            .ok_or_else(|| Error::Task(format!("{} is not open", kind)))
    }

    fn flush(&mut self) -> Result<(), Error> {
        for file in self.files.values_mut() {
            file.writer.flush()?;
        }
        Ok(())
    }
}

impl Writer for CsvWriter {
    fn create(&mut self) -> Result<(), Error> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn delete(&mut self) -> Result<(), Error> {
        self.files.clear();
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn add_entity(&mut self, entity: &Entity) -> Result<String, Error> {
        let kind = entity.kind();
        let file = self.file(entity)?;
        let mut row = entity.text_row();
        let extra = &entity.meta().extra;
        for column in &file.extra_columns {
            let value = extra
                .iter()
                .find(|(k, _)| k == column)
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            row.push(value);
        }
        for (column, _) in extra {
            if !file.extra_columns.contains(column) && file.dropped_columns.insert(column.clone()) {
                warn!(
                    "{}: column '{}' is not in the header written, its values are dropped",
                    kind.collection(),
                    column
                );
            }
        }
        file.writer
            .write_record(&row)
            .map_err(|e| Self::csv_error(kind, e))?;
        Ok(entity.entity_id().to_owned())
    }

    fn new_reader(&mut self) -> Result<Box<dyn Reader>, Error> {
        self.flush()?;
        Ok(Box::new(CsvReader::open(&self.dir)?))
    }

    fn close(&mut self) -> Result<(), Error> {
        self.flush()?;
        info!("feed written in {}", self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryWriter;
    use crate::filters::{Filter, ImplicitServiceExpander, NetworkExpander};
    use crate::{Copier, CopierOptions};
    use gtfs_structures::Stop;
    use std::path::Path;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../gtfs-structure/fixtures/basic")
    }

    fn stop(id: &str, extra: Vec<(&str, &str)>) -> Entity {
        let mut stop: Entity = Stop {
            id: id.to_owned(),
            name: "Stop".into(),
            ..Default::default()
        }
        .into();
        stop.meta_mut().extra = extra
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        stop
    }

    #[tokio::test]
    async fn basic_feed_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let reader = CsvReader::open(fixture()).unwrap();
        let mut csv = CsvWriter::new(&out);
        csv.create().unwrap();
        let mut copier = Copier::new(&reader, &mut csv, CopierOptions::default());
        let expanders: Vec<Box<dyn Filter>> = vec![
            Box::new(NetworkExpander::new()),
            Box::new(ImplicitServiceExpander::new()),
        ];
        for filter in expanders {
            copier.add_filter(filter);
        }
        let first = copier.copy().await.unwrap();
        drop(copier);
        assert_eq!(0, first.error_count(), "{:#?}", first);
        let back = csv.new_reader().unwrap();
        csv.close().unwrap();
        assert!(back.validate_structure().is_empty());

        let mut memory = MemoryWriter::new();
        let second = Copier::new(back.as_ref(), &mut memory, CopierOptions::default())
            .copy()
            .await
            .unwrap();
        assert_eq!(0, second.error_count(), "{:#?}", second);
        for report in &first.collections {
            assert_eq!(
                Some(report.written),
                second.collection(&report.collection).map(|c| c.written),
                "{}",
                report.collection
            );
        }
        match memory
            .entities(EntityKind::Stop)
            .iter()
            .find(|e| e.entity_id() == "stop2")
        {
            Some(Entity::Stop(s)) => assert_eq!(
                vec![("tts_stop_name".to_owned(), "stop point".to_owned())],
                s.meta.extra
            ),
            e => panic!("stop2 not copied: {:?}", e),
        }
    }

    #[test]
    fn later_extra_columns_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = CsvWriter::new(dir.path());
        csv.create().unwrap();
        assert_eq!("a", csv.add_entity(&stop("a", vec![("platform", "1")])).unwrap());
        assert_eq!("b", csv.add_entity(&stop("b", vec![("platform", "2"), ("color", "red")])).unwrap());
        assert_eq!("c", csv.add_entity(&stop("c", vec![])).unwrap());
        csv.close().unwrap();

        let text = std::fs::read_to_string(dir.path().join("stops.txt")).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.ends_with(",platform"), "{}", header);
        assert!(!header.contains("color"));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(3, rows.len());
        assert!(rows[0].ends_with(",1"));
        assert!(rows[1].ends_with(",2"));
        assert!(rows[2].ends_with(','));
    }

    #[test]
    fn delete_removes_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut csv = CsvWriter::new(&out);
        csv.create().unwrap();
        csv.add_entity(&stop("a", vec![])).unwrap();
        csv.close().unwrap();
        assert!(out.join("stops.txt").is_file());
        csv.delete().unwrap();
        assert!(!out.exists());
    }
}
