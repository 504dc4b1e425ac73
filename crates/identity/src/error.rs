use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The external key is already owned by a different canonical identity.
    /// Surfaced for operator resolution, never auto-resolved.
    #[error("external key already bound to {conflict_uid}")]
    IdentityConflict { conflict_uid: String },

    #[error("no delivery target bound for {ty_uid}")]
    NotFound { ty_uid: String },

    #[error("unknown user: {ty_uid}")]
    UnknownUser { ty_uid: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn conflict(conflict_uid: impl Into<String>) -> Self {
        Self::IdentityConflict {
            conflict_uid: conflict_uid.into(),
        }
    }

    #[must_use]
    pub fn not_found(ty_uid: impl Into<String>) -> Self {
        Self::NotFound {
            ty_uid: ty_uid.into(),
        }
    }

    #[must_use]
    pub fn unknown_user(ty_uid: impl Into<String>) -> Self {
        Self::UnknownUser {
            ty_uid: ty_uid.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
