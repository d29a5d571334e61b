use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatorestError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Transport error: status {status}: {body}")]
    Transport { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Transaction already submitted")]
    AlreadySubmitted,
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Tempid resolution failed: {0}")]
    Resolution(String),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T> = std::result::Result<T, DatorestError>;

// Helper conversions
impl From<reqwest::Error> for DatorestError {
    fn from(e: reqwest::Error) -> Self { Self::Http(e.to_string()) }
}

impl From<std::io::Error> for DatorestError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}

impl From<config::ConfigError> for DatorestError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl<R: pest::RuleType> From<pest::error::Error<R>> for DatorestError {
    fn from(e: pest::error::Error<R>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::Parse { message: e.variant.message().to_string(), line: Some(line), col: Some(col) }
    }
}
