//! Module for the error management
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Specific line from a CSV file that could not be read
#[derive(Debug)]
pub struct LineError {
    /// Headers of the CSV file
    pub headers: Vec<String>,
    /// Values of the line that could not be parsed
    pub values: Vec<String>,
}

/// A fatal error: the whole copy or read operation cannot go on.
///
/// Problems scoped to a single record are reported as [EntityError] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory file is not present in the archive
    #[error("Cound not find file {0}")]
    MissingFile(String),
    /// A mandatory file is present but has no header line
    #[error("file {0} is empty")]
    EmptyFile(String),
    /// A mandatory column is not present in a file
    #[error("file {file_name} has no column {column}")]
    MissingColumn {
        /// File missing the column
        file_name: String,
        /// Name of the missing column
        column: String,
    },
    /// The same column appears twice in a file
    #[error("file {file_name} has duplicate column {column}")]
    DuplicateColumn {
        /// File with the duplicate
        file_name: String,
        /// Name of the duplicated column
        column: String,
    },
    /// The collection name does not belong to any known entity type
    #[error("unknown collection {0}")]
    UnknownCollection(String),
    /// The given path to the GTFS is neither a file nor a directory
    #[error("Could not read GTFS: {0} is neither a file nor a directory")]
    NotFileNorDirectory(String),
    /// No adapter is registered for that location
    #[error("no adapter can handle '{0}'")]
    UnsupportedAdapter(String),
    /// Options or filter parameters that cannot work
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The time is not given in the HH:MM:SS format
    #[error("'{0}' is not a valid time; HH:MM:SS format is expected.")]
    InvalidTime(String),
    /// The color is not given in the RRGGBB format, without a leading `#`
    #[error("'{0}' is not a valid color; RRGGBB format is expected, without a leading `#`")]
    InvalidColor(String),
    /// An entity error escalated because the copy runs in fail fast mode
    #[error("{collection}: {error}")]
    Entity {
        /// Collection of the failing entity
        collection: String,
        /// What went wrong
        error: EntityError,
    },
    /// A background reader or writer task died
    #[error("background task failed: {0}")]
    Task(String),
    /// Generic Input/Output error while reading a file
    #[error("impossible to read file")]
    IO(#[from] std::io::Error),
    /// Impossible to read a file
    #[error("impossible to read '{file_name}'")]
    NamedFileIO {
        /// The file name that could not be read
        file_name: String,
        /// The inital error that caused the unability to read the file
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Impossible to read a CSV file
    #[error("impossible to read csv file '{file_name}'")]
    CSVError {
        /// File name that could not be parsed as CSV
        file_name: String,
        /// The initial error by the csv library
        #[source]
        source: csv::Error,
        /// The line that could not be parsed by the csv library
        line_in_error: Option<LineError>,
    },
    /// Error when trying to unzip the GTFS archive
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Error from the relational destination
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Kinds of per-entity problems. Reports are grouped by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The raw row could not be read at all
    Row,
    /// A field could not be converted to its type
    Field,
    /// A required field is empty
    Required,
    /// A numeric field is out of bounds
    Range,
    /// A value is not part of the allowed set
    Enum,
    /// A foreign key points to nothing copied so far
    Reference,
    /// Ordering problem among records owned by the same parent
    Sequence,
    /// A filter stage rejected the entity
    Filter,
    /// Advisory, never drops the entity
    Warning,
}

impl ErrorKind {
    /// Snake case name, as used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Row => "row",
            ErrorKind::Field => "field",
            ErrorKind::Required => "required",
            ErrorKind::Range => "range",
            ErrorKind::Enum => "enum",
            ErrorKind::Reference => "reference",
            ErrorKind::Sequence => "sequence",
            ErrorKind::Filter => "filter",
            ErrorKind::Warning => "warning",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem scoped to one entity. It drops that entity (unless it is a warning), never the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub struct EntityError {
    /// Kind of the problem
    pub kind: ErrorKind,
    /// Column concerned, if any
    pub field: Option<String>,
    /// Offending value, if any
    pub value: Option<String>,
    /// Human readable explanation
    pub message: String,
    /// Line in the source file (1 is the header)
    pub line: Option<u64>,
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        if let Some(field) = &self.field {
            write!(f, " on field {}", field)?;
        }
        if let Some(value) = &self.value {
            write!(f, " (value '{}')", value)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        Ok(())
    }
}

impl EntityError {
    fn new(kind: ErrorKind, field: Option<&str>, value: Option<&str>, message: String) -> Self {
        Self {
            kind,
            field: field.map(str::to_owned),
            value: value.map(str::to_owned),
            message,
            line: None,
        }
    }

    /// The row could not be read
    pub fn row(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Row, None, None, message.into())
    }

    /// The text of a field could not be parsed
    pub fn invalid_field(field: &str, value: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Field, Some(field), Some(value), message.into())
    }

    /// A required field is empty
    pub fn required(field: &str) -> Self {
        Self::new(
            ErrorKind::Required,
            Some(field),
            None,
            "required field is empty".to_owned(),
        )
    }

    /// A numeric value outside of `[min, max]`
    pub fn range(field: &str, value: &str, min: f64, max: f64) -> Self {
        Self::new(
            ErrorKind::Range,
            Some(field),
            Some(value),
            format!("must be between {} and {}", min, max),
        )
    }

    /// A value outside of the allowed set
    pub fn enumeration(field: &str, value: &str, allowed: &[i64]) -> Self {
        Self::new(
            ErrorKind::Enum,
            Some(field),
            Some(value),
            format!("must be one of {:?}", allowed),
        )
    }

    /// `value` was never copied into `target`
    pub fn reference(field: &str, value: &str, target: &str) -> Self {
        Self::new(
            ErrorKind::Reference,
            Some(field),
            Some(value),
            format!("no {} entity with this id was copied", target),
        )
    }

    /// Ordering or uniqueness problem among siblings
    pub fn sequence(field: Option<&str>, value: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sequence, field, value, message.into())
    }

    /// Rejection by a filter stage
    pub fn filter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Filter, None, None, message.into())
    }

    /// Free form problem on a field, with an explicit kind
    pub fn on_field(kind: ErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Some(field), None, message.into())
    }

    /// Advisory condition
    pub fn warning(field: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Warning, field, None, message.into())
    }

    /// Attaches the source line
    pub fn at_line(mut self, line: Option<u64>) -> Self {
        if self.line.is_none() {
            self.line = line;
        }
        self
    }
}
