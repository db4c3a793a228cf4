use crimestat_contracts::ErrorKind;

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    Schema(String),
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Schema(detail) => write!(f, "store schema mismatch: {}", detail),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

#[derive(Debug)]
pub enum EngineError {
    UnknownTable(String),
    UnknownDimension {
        table: &'static str,
        dimension: String,
    },
    InvalidFilter {
        table: &'static str,
        key: String,
        reason: &'static str,
    },
    MeasureOverflow {
        table: &'static str,
        raw: String,
    },
    Store(StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownTable(_) => ErrorKind::UnknownTable,
            EngineError::UnknownDimension { .. } => ErrorKind::UnknownDimension,
            EngineError::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            EngineError::MeasureOverflow { .. } => ErrorKind::MeasureOverflow,
            EngineError::Store(_) => ErrorKind::StoreFailure,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownTable(table) => write!(f, "unknown table: {}", table),
            EngineError::UnknownDimension { table, dimension } => {
                write!(f, "unknown dimension `{}` for table {}", dimension, table)
            }
            EngineError::InvalidFilter { table, key, reason } => {
                write!(f, "invalid filter `{}` for table {}: {}", key, table, reason)
            }
            EngineError::MeasureOverflow { table, raw } => {
                write!(f, "summed measure {} out of range for table {}", raw, table)
            }
            EngineError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        EngineError::Store(value)
    }
}
