use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("ForgeError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for ForgeError {
    fn from(error: std::io::Error) -> Self {
        ForgeError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(error: reqwest::Error) -> Self {
        ForgeError::Reqwest(Box::new(error))
    }
}
