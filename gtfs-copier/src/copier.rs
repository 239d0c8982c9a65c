//! The copy of a feed from a [Reader] to a [Writer].
//!
//! Collections are copied one after the other in [EntityKind::ALL] order, so that every
//! reference points to a collection already copied. Each entity goes through the filter
//! pipeline, the validation, the rewriting of its references, then the writer; the identifier
//! the writer returns is recorded in the [EntityMap].
use crate::adapters::{EntityStream, Reader, StreamItem, StreamOptions, Writer};
use crate::entity_map::EntityMap;
use crate::filters::{Filter, Pipeline};
use geo_types::Point;
use gtfs_structures::validation::validate_stop_times;
use gtfs_structures::{Entity, EntityError, EntityKind, Error, ErrorKind, StopTime};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// How a copy behaves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopierOptions {
    /// Capacity of the queue between a reader and the copier
    pub buffer_size: usize,
    /// Trips per bulk stop time read, and stop times per batched write
    pub batch_size: usize,
    /// The first entity error aborts the copy
    pub fail_fast: bool,
    /// Entities failing validation are still copied, their errors reported as warnings.
    /// Unresolved references still drop the entity
    pub allow_entity_errors: bool,
    /// Detailed errors and warnings kept per collection. Counts are never capped
    pub error_limit: usize,
}

impl Default for CopierOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            batch_size: 1000,
            fail_fast: false,
            allow_entity_errors: false,
            error_limit: 100,
        }
    }
}

/// How a copy ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    Completed,
    Cancelled,
}

/// What happened to one collection
#[derive(Debug, Default, Clone, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    /// Items taken from the reader, unreadable rows included
    pub read: usize,
    /// Entities accepted by the writer, created ones included
    pub written: usize,
    pub dropped: usize,
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    pub warning_count: usize,
    /// The first errors, up to the error limit
    pub errors: Vec<EntityError>,
    /// The first warnings, up to the error limit
    pub warnings: Vec<EntityError>,
}

impl CollectionReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            collection: kind.collection().to_owned(),
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors_by_kind.values().sum()
    }

    fn error(&mut self, error: EntityError, limit: usize) {
        *self.errors_by_kind.entry(error.kind).or_default() += 1;
        if self.errors.len() < limit {
            self.errors.push(error);
        }
    }

    fn warning(&mut self, warning: EntityError, limit: usize) {
        self.warning_count += 1;
        if self.warnings.len() < limit {
            self.warnings.push(warning);
        }
    }
}

/// Outcome of a copy that did not fail
#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub status: CopyStatus,
    /// In processing order, only the collections something happened to
    pub collections: Vec<CollectionReport>,
}

impl CopyResult {
    pub fn collection(&self, collection: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == collection)
    }

    pub fn error_count(&self) -> usize {
        self.collections.iter().map(CollectionReport::error_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.collections.iter().map(|c| c.warning_count).sum()
    }
}

enum Prepared {
    Ready(Entity),
    // a stop whose parent station is not copied yet
    Deferred(Entity),
    Rejected,
}

/// Copies a feed. One copier does one copy
pub struct Copier<'a> {
    reader: &'a dyn Reader,
    writer: &'a mut dyn Writer,
    options: CopierOptions,
    pipeline: Pipeline,
    map: EntityMap,
    cancel: CancellationToken,
    reports: BTreeMap<EntityKind, CollectionReport>,
}

impl<'a> Copier<'a> {
    pub fn new(reader: &'a dyn Reader, writer: &'a mut dyn Writer, options: CopierOptions) -> Self {
        Self {
            reader,
            writer,
            options,
            pipeline: Pipeline::new(),
            map: EntityMap::new(),
            cancel: CancellationToken::new(),
            reports: BTreeMap::new(),
        }
    }

    /// Starts from identifiers already copied, e.g. to merge a feed into a destination
    pub fn with_entity_map(mut self, map: EntityMap) -> Self {
        self.map = map;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registers a stage after the ones already registered
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.pipeline.add(filter);
    }

    pub fn entity_map(&self) -> &EntityMap {
        &self.map
    }

    pub fn into_entity_map(self) -> EntityMap {
        self.map
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            buffer_size: self.options.buffer_size,
            cancel: self.cancel.clone(),
        }
    }

    fn report(&mut self, kind: EntityKind) -> &mut CollectionReport {
        self.reports
            .entry(kind)
            .or_insert_with(|| CollectionReport::new(kind))
    }

    /// Runs the copy. Entity errors end up in the result, only fatal errors are returned as `Err`
    pub async fn copy(&mut self) -> Result<CopyResult, Error> {
        info!(
            "copy started, filters: [{}]",
            self.pipeline.names().join(", ")
        );
        let mut status = CopyStatus::Completed;
        for kind in EntityKind::ALL {
            if self.cancel.is_cancelled() {
                status = CopyStatus::Cancelled;
                break;
            }
            let collection_status = if *kind == EntityKind::StopTime {
                self.copy_stop_times().await?
            } else {
                self.copy_collection(*kind).await?
            };
            if let Some(report) = self.reports.get(kind) {
                info!(
                    "{}: {} read, {} written, {} dropped, {} warnings",
                    kind, report.read, report.written, report.dropped, report.warning_count
                );
            }
            if collection_status == CopyStatus::Cancelled {
                status = CopyStatus::Cancelled;
                break;
            }
        }
        if status == CopyStatus::Cancelled {
            warn!("copy cancelled");
        }
        Ok(CopyResult {
            status,
            collections: std::mem::take(&mut self.reports).into_values().collect(),
        })
    }

    // next item of the stream, `None` at its end or once cancelled
    async fn next(cancel: &CancellationToken, stream: &mut EntityStream) -> Option<StreamItem> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = stream.next() => item,
        }
    }

    async fn copy_collection(&mut self, kind: EntityKind) -> Result<CopyStatus, Error> {
        let mut stream = match self.reader.read(kind, &self.stream_options())? {
            Some(stream) => stream,
            None => {
                debug!("{} is not in the source", kind);
                return Ok(CopyStatus::Completed);
            }
        };
        info!("copying {}", kind);
        let cancel = self.cancel.clone();
        let mut deferred = Vec::new();
        while let Some(item) = Self::next(&cancel, &mut stream).await {
            self.report(kind).read += 1;
            match item {
                Ok(entity) => {
                    if let Err(e) = self.process(entity, &mut deferred) {
                        stream.finish().await?;
                        return Err(e);
                    }
                }
                Err(error) => {
                    if let Err(e) = self.reject(kind, "", vec![error], 1) {
                        stream.finish().await?;
                        return Err(e);
                    }
                }
            }
        }
        stream.finish().await?;
        if cancel.is_cancelled() {
            return Ok(CopyStatus::Cancelled);
        }
        self.retry_deferred(deferred)?;
        Ok(CopyStatus::Completed)
    }

    /// Pipeline, then validation, rewriting, writing and recording of every output
    fn process(&mut self, mut entity: Entity, deferred: &mut Vec<(Entity, String)>) -> Result<(), Error> {
        let kind = entity.kind();
        let old_id = entity.entity_id().to_owned();
        if let Err(error) = self.pipeline.filter(&mut entity, &self.map) {
            return self.reject(kind, &old_id, vec![error.at_line(entity.meta().line)], 1);
        }
        let filtered_id = entity.entity_id().to_owned();
        let line = entity.meta().line;
        let outputs = match self.pipeline.expand(entity, &self.map) {
            Ok(outputs) => outputs,
            Err(error) => return self.reject(kind, &old_id, vec![error.at_line(line)], 1),
        };
        for output in outputs {
            // the entity itself keeps its source identifier, created ones have no other
            let source_id = if output.kind() == kind && output.entity_id() == filtered_id {
                old_id.clone()
            } else {
                output.entity_id().to_owned()
            };
            match self.prepare(output, &source_id, true)? {
                Prepared::Ready(entity) => self.write(entity, &source_id)?,
                Prepared::Deferred(entity) => deferred.push((entity, source_id)),
                Prepared::Rejected => {}
            }
        }
        Ok(())
    }

    /// Validation and rewriting of the references
    fn prepare(&mut self, mut entity: Entity, old_id: &str, can_defer: bool) -> Result<Prepared, Error> {
        let kind = entity.kind();
        let line = entity.meta().line;
        let errors = entity.errors();
        let mut warnings = entity.warnings();
        if !errors.is_empty() {
            if !self.options.allow_entity_errors {
                self.reject(kind, old_id, errors, 1)?;
                return Ok(Prepared::Rejected);
            }
            warnings.extend(errors);
        }
        if can_defer {
            if let Entity::Stop(stop) = &entity {
                if let Some(parent) = stop.parent_station.as_deref() {
                    if !parent.is_empty() && !self.map.contains(kind.collection(), parent) {
                        return Ok(Prepared::Deferred(entity));
                    }
                }
            }
        }
        if let Err(error) = entity.update_keys(&self.map) {
            self.reject(kind, old_id, vec![error.at_line(line)], 1)?;
            return Ok(Prepared::Rejected);
        }
        let limit = self.options.error_limit;
        let report = self.report(kind);
        for warning in warnings {
            report.warning(warning, limit);
        }
        Ok(Prepared::Ready(entity))
    }

    fn write(&mut self, entity: Entity, old_id: &str) -> Result<(), Error> {
        let new_id = self.writer.add_entity(&entity)?;
        self.record(&entity, old_id, &new_id)?;
        self.report(entity.kind()).written += 1;
        Ok(())
    }

    fn record(&mut self, entity: &Entity, old_id: &str, new_id: &str) -> Result<(), Error> {
        let kind = entity.kind();
        let collection = kind.collection();
        match entity {
            Entity::Stop(stop) => {
                if let Some((longitude, latitude)) = stop.coordinates() {
                    self.map
                        .add_stop_geometry(old_id, Point::new(longitude, latitude));
                }
            }
            Entity::Shape(point) => {
                let unique =
                    self.map
                        .add_shape_point(old_id, point.sequence, point.longitude, point.latitude);
                if !unique {
                    let limit = self.options.error_limit;
                    let warning = EntityError::warning(
                        Some("shape_pt_sequence"),
                        format!("duplicate shape_pt_sequence {} in shape '{}'", point.sequence, old_id),
                    )
                    .at_line(point.meta.line);
                    self.report(kind).warning(warning, limit);
                }
                // every point shares the identifier, the first one is referenced
                if self.map.contains(collection, old_id) {
                    return Ok(());
                }
            }
            _ => {}
        }
        // the single agency of a feed may have no identifier, routes then refer to it with none
        if old_id.is_empty() && kind != EntityKind::Agency {
            return Ok(());
        }
        if kind.id_column().is_none() {
            return Ok(());
        }
        if self.map.contains(collection, old_id) {
            let limit = self.options.error_limit;
            let warning = EntityError::warning(kind.id_column(), format!("duplicate identifier '{}'", old_id))
                .at_line(entity.meta().line);
            self.report(kind).warning(warning, limit);
        }
        self.map.set(collection, old_id, new_id)
    }

    /// Records the errors of an entity that is not copied
    fn reject(
        &mut self,
        kind: EntityKind,
        old_id: &str,
        errors: Vec<EntityError>,
        dropped: usize,
    ) -> Result<(), Error> {
        if self.options.fail_fast {
            if let Some(error) = errors.into_iter().next() {
                return Err(Error::Entity {
                    collection: kind.collection().to_owned(),
                    error,
                });
            }
            return Ok(());
        }
        let limit = self.options.error_limit;
        let report = self.report(kind);
        report.dropped += dropped;
        for error in errors {
            debug!("{} '{}' dropped: {}", kind, old_id, error);
            report.error(error, limit);
        }
        Ok(())
    }

    /// Stops whose parent came later in the source. Retried until nothing moves, what is left
    /// fails on its unresolved reference
    fn retry_deferred(&mut self, mut deferred: Vec<(Entity, String)>) -> Result<(), Error> {
        if deferred.is_empty() {
            return Ok(());
        }
        warn!(
            "{} stops listed before their parent station, retrying them",
            deferred.len()
        );
        loop {
            let before = deferred.len();
            let mut pending = Vec::new();
            for (entity, old_id) in deferred {
                match self.prepare(entity, &old_id, true)? {
                    Prepared::Ready(entity) => self.write(entity, &old_id)?,
                    Prepared::Deferred(entity) => pending.push((entity, old_id)),
                    Prepared::Rejected => {}
                }
            }
            deferred = pending;
            if deferred.is_empty() || deferred.len() == before {
                break;
            }
        }
        for (entity, old_id) in deferred {
            if let Prepared::Ready(entity) = self.prepare(entity, &old_id, false)? {
                self.write(entity, &old_id)?;
            }
        }
        Ok(())
    }

    /// Stop times are read per batch of copied trips and checked trip by trip
    async fn copy_stop_times(&mut self) -> Result<CopyStatus, Error> {
        let kind = EntityKind::StopTime;
        let trip_ids: Vec<String> = self
            .map
            .keys_for(EntityKind::Trip.collection())
            .into_iter()
            .map(str::to_owned)
            .collect();
        let cancel = self.cancel.clone();
        let batch_size = self.options.batch_size.max(1);
        let mut announced = false;
        for chunk in trip_ids.chunks(batch_size) {
            let mut stream = match self
                .reader
                .stop_times_by_trip_ids(chunk.to_vec(), &self.stream_options())?
            {
                Some(stream) => stream,
                None => {
                    debug!("{} is not in the source", kind);
                    return Ok(CopyStatus::Completed);
                }
            };
            if !announced {
                info!("copying {} of {} trips", kind, trip_ids.len());
                announced = true;
            }
            let mut by_trip: FxHashMap<String, Vec<StopTime>> = FxHashMap::default();
            let mut unreadable = Vec::new();
            while let Some(item) = Self::next(&cancel, &mut stream).await {
                self.report(kind).read += 1;
                match item {
                    Ok(Entity::StopTime(st)) => by_trip.entry(st.trip_id.clone()).or_default().push(st),
                    Ok(other) => unreadable.push(EntityError::row(format!(
                        "{} found among stop times",
                        other.kind()
                    ))),
                    Err(error) => unreadable.push(error),
                }
            }
            stream.finish().await?;
            if cancel.is_cancelled() {
                return Ok(CopyStatus::Cancelled);
            }
            for error in unreadable {
                self.reject(kind, "", vec![error], 1)?;
            }

            let mut batch = Vec::with_capacity(batch_size);
            for trip_id in chunk {
                let mut stop_times = match by_trip.remove(trip_id) {
                    Some(stop_times) => stop_times,
                    None => continue,
                };
                let errors = validate_stop_times(&mut stop_times);
                if !errors.is_empty() {
                    if !self.options.allow_entity_errors {
                        let dropped = stop_times.len();
                        self.reject(kind, trip_id, errors, dropped)?;
                        continue;
                    }
                    let limit = self.options.error_limit;
                    let report = self.report(kind);
                    for error in errors {
                        report.warning(error, limit);
                    }
                }
                for st in stop_times {
                    self.process_stop_time(Entity::StopTime(st), &mut batch)?;
                    if batch.len() >= batch_size {
                        self.flush(&mut batch)?;
                    }
                }
            }
            self.flush(&mut batch)?;
        }
        self.reject_orphan_stop_times(trip_ids).await
    }

    /// Stop times whose trip was not copied, one reference error each. Rows that could not be
    /// decoded come out of this scan too.
    async fn reject_orphan_stop_times(&mut self, trip_ids: Vec<String>) -> Result<CopyStatus, Error> {
        let kind = EntityKind::StopTime;
        let cancel = self.cancel.clone();
        let mut stream = match self
            .reader
            .stop_times_of_other_trips(trip_ids, &self.stream_options())?
        {
            Some(stream) => stream,
            None => return Ok(CopyStatus::Completed),
        };
        let mut orphans = 0;
        while let Some(item) = Self::next(&cancel, &mut stream).await {
            self.report(kind).read += 1;
            let error = match item {
                Ok(Entity::StopTime(st)) => {
                    orphans += 1;
                    EntityError::reference("trip_id", &st.trip_id, EntityKind::Trip.collection())
                        .at_line(st.meta.line)
                }
                Ok(other) => EntityError::row(format!("{} found among stop times", other.kind())),
                Err(error) => error,
            };
            if let Err(e) = self.reject(kind, "", vec![error], 1) {
                stream.finish().await?;
                return Err(e);
            }
        }
        stream.finish().await?;
        if cancel.is_cancelled() {
            return Ok(CopyStatus::Cancelled);
        }
        if orphans > 0 {
            warn!("{} {} belong to trips that were not copied", orphans, kind);
        }
        Ok(CopyStatus::Completed)
    }

    // like `process`, stop times being batched instead of written one by one
    fn process_stop_time(&mut self, mut entity: Entity, batch: &mut Vec<Entity>) -> Result<(), Error> {
        let kind = entity.kind();
        let line = entity.meta().line;
        if let Err(error) = self.pipeline.filter(&mut entity, &self.map) {
            return self.reject(kind, "", vec![error.at_line(line)], 1);
        }
        let outputs = match self.pipeline.expand(entity, &self.map) {
            Ok(outputs) => outputs,
            Err(error) => return self.reject(kind, "", vec![error.at_line(line)], 1),
        };
        for output in outputs {
            let source_id = output.entity_id().to_owned();
            match self.prepare(output, &source_id, false)? {
                Prepared::Ready(entity) if entity.kind() == kind => batch.push(entity),
                Prepared::Ready(entity) => self.write(entity, &source_id)?,
                Prepared::Deferred(_) | Prepared::Rejected => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self, batch: &mut Vec<Entity>) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let ids = self.writer.add_entities(batch)?;
        self.report(EntityKind::StopTime).written += ids.len();
        batch.clear();
        Ok(())
    }
}
