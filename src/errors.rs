use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to resolve required path: {0}")]
    Path(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid XMP document: {0}")]
    XmpRead(#[from] roxmltree::Error),
    #[error("failed to rewrite XMP document: {0}")]
    XmpWrite(#[from] quick_xml::Error),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Config(String),
}
