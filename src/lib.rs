//! Google Analytics 4 report extraction for Rust.
//!
//! Authenticates with a stored OAuth2 token, queries the GA4 Data API for one
//! property (single run) or for every brand × date range × report combination
//! of a batch config, and writes the rows to timestamped delimited text files.
//!
//! # Quick start
//!
//! ```no_run
//! use ga4_extract::{Extractor, SingleRunSettings};
//!
//! let extractor = Extractor::builder()
//!     .token_path("credentials/token.json")
//!     .output_dir("output")
//!     .build()
//!     .unwrap();
//!
//! let settings = SingleRunSettings::from_env().unwrap();
//! let path = extractor.run_single(&settings).unwrap();
//!
//! let config = ga4_extract::batch::load_batch_config("batch_config.toml".as_ref()).unwrap();
//! let batch = Extractor::builder().build_for_batch(&config).unwrap();
//! let summary = batch.run_batch(&config).unwrap();
//! ```
//!
//! The network sits behind [`ReportExecutor`], so the coordinators in
//! [`single`] and [`batch`] can be driven by any implementation.

pub mod auth;
pub mod batch;
pub mod config;
pub mod dates;
pub mod error;
pub mod executor;
pub mod export;
pub mod models;
pub mod properties;
pub mod single;

pub use auth::{Credential, CredentialStore, IdentityProvider, OAuthRefresher, TokenSource};
pub use batch::{BatchRunner, BatchSummary, Pacer, ThreadSleep};
pub use config::{Settings, SingleRunSettings};
pub use dates::DateExpr;
pub use error::{ExtractError, Result};
pub use executor::{DataApiExecutor, ReportExecutor};
pub use export::{Delimiter, Exporter};

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDate;

use models::BatchConfig;
use properties::{AdminClient, PropertySummary};

// ---------------------------------------------------------------------------
// ExtractorBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing an [`Extractor`].
///
/// Use [`Extractor::builder()`] to obtain a builder, chain configuration
/// methods, and call [`build()`](ExtractorBuilder::build).
#[derive(Default)]
pub struct ExtractorBuilder {
    settings: Settings,
    provider: Option<Box<dyn IdentityProvider>>,
    today: Option<NaiveDate>,
}

impl ExtractorBuilder {
    /// Start from settings already read from the environment.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Path of the OAuth2 token file.
    pub fn token_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings.token_path = path.as_ref().to_path_buf();
        self
    }

    /// Directory output files are written to. Batch files go to its
    /// `batch` subdirectory.
    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings.output_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.settings.delimiter = delimiter;
        self
    }

    /// HTTP timeout for API and token requests.
    ///
    /// Defaults to 60 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Use a custom identity provider for token refresh.
    pub fn identity_provider(mut self, provider: Box<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Resolve relative date expressions against a fixed date.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Load the token file, refreshing it if expired, and set up the API
    /// client.
    ///
    /// No report is queried here; a missing or unusable token fails now.
    pub fn build(self) -> Result<Extractor> {
        let provider = match self.provider {
            Some(p) => p,
            None => Box::new(OAuthRefresher::new(self.settings.timeout)?),
        };
        let store = CredentialStore::new(&self.settings.token_path, provider);
        let credential = store.load_valid()?;
        if credential.access_token().is_none() {
            return Err(ExtractError::CredentialsInvalid(
                "token file has no access token".to_string(),
            ));
        }
        let tokens = Rc::new(TokenSource::new(store, credential));
        let executor = DataApiExecutor::new(Rc::clone(&tokens), self.settings.timeout)?;

        Ok(Extractor {
            settings: self.settings,
            tokens,
            executor,
            today: self.today,
        })
    }

    /// Check that `config` has an eligible brand, then [`build`](Self::build).
    ///
    /// A batch with nothing to query fails with
    /// [`ExtractError::NoBrandsConfigured`] before the token file is read or
    /// refreshed.
    pub fn build_for_batch(self, config: &BatchConfig) -> Result<Extractor> {
        batch::plan(config)?;
        config.request_delay()?;
        self.build()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Authenticated entry point for single runs, batches and property listing.
///
/// Created via [`Extractor::builder()`].
pub struct Extractor {
    settings: Settings,
    tokens: Rc<TokenSource>,
    executor: DataApiExecutor,
    today: Option<NaiveDate>,
}

impl Extractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The credential currently in use, including any refresh since build.
    pub fn credential(&self) -> Credential {
        self.tokens.credential()
    }

    pub fn executor(&self) -> &DataApiExecutor {
        &self.executor
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(dates::local_today)
    }

    /// Query one report and write it to `output_dir`.
    pub fn run_single(&self, settings: &SingleRunSettings) -> Result<PathBuf> {
        let exporter = Exporter::new(&self.settings.output_dir, self.settings.delimiter);
        single::run_single(settings, &self.executor, &exporter, self.today())
    }

    /// Batch runner over the API executor, writing under `output_dir/batch`.
    pub fn batch_runner(&self) -> BatchRunner<&DataApiExecutor> {
        let exporter = Exporter::new(self.settings.batch_output_dir(), self.settings.delimiter);
        BatchRunner::new(&self.executor, exporter).with_today(self.today())
    }

    /// Run every combination of `config`, writing under `output_dir/batch`.
    pub fn run_batch(&self, config: &BatchConfig) -> Result<BatchSummary> {
        self.batch_runner().run_batch(config)
    }

    /// List accessible properties and export them to `output_dir`.
    pub fn list_properties(&self) -> Result<(Vec<PropertySummary>, PathBuf)> {
        let admin = AdminClient::new(Rc::clone(&self.tokens), self.settings.timeout)?;
        let props = admin.list_properties()?;
        let exporter = Exporter::new(&self.settings.output_dir, self.settings.delimiter);
        let path = exporter.export(&properties::to_table(&props), properties::PROPERTIES_PREFIX)?;
        Ok((props, path))
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Extractor(token_path={}, output_dir={}, delimiter={})",
            self.settings.token_path.display(),
            self.settings.output_dir.display(),
            self.settings.delimiter
        )
    }
}
