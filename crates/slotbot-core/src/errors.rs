/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the core and
/// the HTTP layer can handle failures consistently (client error vs server error).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid date/time format: {0}")]
    InvalidFormat(String),

    #[error("invalid month: {0}")]
    InvalidMonth(u32),

    #[error("empty message")]
    EmptyMessage,

    #[error("invalid reply: expected slot numbers or WRONG")]
    InvalidReply,

    #[error("no valid time slot was chosen")]
    NoChoiceMade,

    #[error("no order found for this contact number")]
    OrderNotFound,

    #[error("sms transport failure: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// True for errors caused by the caller's input rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::InvalidMonth(_)
                | Error::EmptyMessage
                | Error::InvalidReply
                | Error::NoChoiceMade
                | Error::Invalid(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::OrderNotFound | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
