use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] tybridge_identity::Error),

    #[error(transparent)]
    Session(#[from] tybridge_session::Error),

    #[error(transparent)]
    Mode(#[from] tybridge_mode::Error),

    #[error(transparent)]
    Delivery(#[from] tybridge_delivery::Error),

    #[error("crm sync failed: {0}")]
    Crm(#[source] anyhow::Error),

    #[error("channel send failed: {0}")]
    Channel(#[source] anyhow::Error),

    #[error("reply production failed: {0}")]
    Reply(#[source] anyhow::Error),

    #[error("operator send rejected by channel, code {code}: {message}")]
    OperatorSendFailed { code: i64, message: String },

    #[error("no identity bound to external key {external_key}")]
    UnknownRecipient { external_key: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
