use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Blocked pre-flight: no usable session. Informational, no network
    /// attempt was made.
    #[error("delivery blocked, session inactive for {ty_uid}")]
    SessionInactive { ty_uid: String },

    /// Blocked pre-flight: breaker open after accumulated failures.
    #[error("delivery blocked, circuit breaker open for {ty_uid}")]
    CircuitBreakerOpen { ty_uid: String },

    /// The ladder was exhausted on classified session rejections; the
    /// session has been invalidated and the original code surfaces upward.
    #[error("channel rejected session, code {code}: {message}")]
    ChannelSessionError { code: i64, message: String },

    /// Any other send failure. Counted toward the breaker, does not force
    /// the session invalid.
    #[error("transient send failure, code {code}: {message}")]
    Transient { code: i64, message: String },

    #[error(transparent)]
    Session(#[from] tybridge_session::Error),

    #[error(transparent)]
    Channel(#[from] anyhow::Error),

    #[error("{message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
