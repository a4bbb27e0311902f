use std::path::PathBuf;

/// Process exit codes, one per failure class.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_AUTH_ERROR: u8 = 2;
pub const EXIT_QUERY_ERROR: u8 = 3;
pub const EXIT_EXPORT_ERROR: u8 = 4;
/// Anything else, including a batch that wrote no files.
pub const EXIT_NO_OUTPUT: u8 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No brands have a property_id filled in")]
    NoBrandsConfigured,

    #[error("Token file not found at {}", .path.display())]
    TokenNotFound { path: PathBuf },

    #[error("Credentials are invalid and cannot be refreshed: {0}")]
    CredentialsInvalid(String),

    #[error("Query against property {property_id} failed: {cause}")]
    Query { property_id: String, cause: String },

    #[error("Export to {} failed: {cause}", .path.display())]
    Export { path: PathBuf, cause: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExtractError {
    /// Build a [`ExtractError::Query`] for the given property.
    pub fn query(property_id: &str, cause: impl ToString) -> Self {
        Self::Query {
            property_id: property_id.to_string(),
            cause: cause.to_string(),
        }
    }

    /// Whether the error happened before any report was queried.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::TokenNotFound { .. } | Self::CredentialsInvalid(_))
    }

    /// Exit code for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) | Self::NoBrandsConfigured | Self::Toml(_) | Self::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            Self::TokenNotFound { .. } | Self::CredentialsInvalid(_) => EXIT_AUTH_ERROR,
            Self::Query { .. } | Self::Http(_) => EXIT_QUERY_ERROR,
            Self::Export { .. } | Self::Csv(_) | Self::Io(_) => EXIT_EXPORT_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
