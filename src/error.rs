use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable fetching error: {0}")]
    EnvVarNotSet(#[from] dotenvy::Error),
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Invalid store \"{code}\", expected one of: {known}")]
    UnknownStore { code: String, known: String },
    #[error("Telephony provider returned status {status}: {body}")]
    Telephony { status: u16, body: String },
    #[error("Email composition error: {0}")]
    Email(String),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

impl From<lettre::address::AddressError> for Error {
    fn from(err: lettre::address::AddressError) -> Self {
        Error::Email(err.to_string())
    }
}

impl From<lettre::error::Error> for Error {
    fn from(err: lettre::error::Error) -> Self {
        Error::Email(err.to_string())
    }
}
