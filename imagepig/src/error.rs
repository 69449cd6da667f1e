use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Boxed cause of a failure in an outside library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The request never produced an HTTP response (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// The API answered with something other than 200.
    #[error("API returned HTTP status {status}")]
    HttpStatus { status: u16 },
    #[error("malformed JSON response: {0}")]
    Parse(#[from] serde_json::Error),
    /// Downloading the generated image failed with a status that is not worth retrying.
    #[error("unexpected HTTP status {status} while downloading {url}")]
    UnexpectedHttpStatus { status: u16, url: String },
    /// The generated image was still missing after every download attempt.
    #[error("{url} was not available after {attempts} attempts")]
    TimeoutExceeded { url: String, attempts: u32 },
    #[error("{0} is not available")]
    CapabilityMissing(&'static str),
    #[error("the response carries no image")]
    NoImage,
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error("cannot decode image: {0}")]
    Image(#[source] BoxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(Box::new(e))
    }
}
