use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Cluster(wfm_cluster::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                match code.as_ref() {
                    // PostgreSQL unique_violation
                    "23505" => Self::AlreadyExists("Resource already exists".to_string()),
                    // PostgreSQL foreign_key_violation
                    "23503" => Self::NotFound("Referenced resource not found".to_string()),
                    // PostgreSQL check_violation
                    "23514" => Self::InvalidInput("Constraint check failed".to_string()),
                    // PostgreSQL not_null_violation
                    "23502" => Self::InvalidInput("Required field is missing".to_string()),
                    _ => Self::Database(err),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable("Database connection unavailable".to_string())
            }
            _ => Self::Database(err),
        }
    }
}

impl From<wfm_cluster::Error> for Error {
    fn from(err: wfm_cluster::Error) -> Self {
        match err {
            wfm_cluster::Error::Database(db_err) => db_err.into(),
            other => Self::Cluster(other),
        }
    }
}

impl Error {
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Cluster(err) => err.is_unavailable(),
            _ => false,
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        if err.is_unavailable() {
            tracing::warn!("Request failed, database unavailable: {err}");
            return Self::unavailable(err.to_string());
        }
        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::InvalidInput(msg) => Self::invalid_argument(msg),
            Error::AlreadyExists(msg) => Self::already_exists(msg),
            other => {
                tracing::error!("Internal error: {other}");
                Self::internal("Internal error")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
