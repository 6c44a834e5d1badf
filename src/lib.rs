pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fields;
pub mod geo;
pub mod mapper;
pub mod provider;
pub mod secrets;
pub mod sidecar;
pub mod stats;

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::catalog::{CatalogResolver, LightroomCatalog};
use crate::engine::{EngineSettings, ResolutionEngine, RunContext};
use crate::provider::build_provider;
use crate::sidecar::XmpSidecarStore;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::fields::{FieldMode, LocationFields, TargetField};
pub use crate::geo::GeoCoordinate;
pub use crate::provider::ProviderKind;
pub use crate::secrets::{CredentialStore, ProviderCredentials};
pub use crate::stats::RunStatistics;

/// Everything one invocation needs to know about what to process and how.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source_folders: Vec<PathBuf>,
    pub exclude_folders: Vec<PathBuf>,
    pub catalog_folder: Option<PathBuf>,
    pub strict: bool,
    pub field_mode: FieldMode,
    pub fuzzy_radius_meters: Option<f64>,
    pub provider: ProviderKind,
    pub test_mode: bool,
    pub no_backup: bool,
}

impl RunOptions {
    pub fn new(source_folders: Vec<PathBuf>) -> Self {
        Self {
            source_folders,
            exclude_folders: Vec::new(),
            catalog_folder: None,
            strict: false,
            field_mode: FieldMode::default(),
            fuzzy_radius_meters: None,
            provider: ProviderKind::Google,
            test_mode: false,
            no_backup: false,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.source_folders.is_empty() {
            return Err(AppError::Config(
                "at least one sidecar source is required".to_string(),
            ));
        }
        if let Some(radius) = self.fuzzy_radius_meters {
            if !radius.is_finite() || radius < 0.0 {
                return Err(AppError::Config(format!(
                    "fuzzy cache radius must be a non-negative number of meters, got {radius}"
                )));
            }
        }
        if self.strict && self.catalog_folder.is_none() {
            warn!(target: "reverse_geolocate", "strict matching has no effect without a catalog");
        }
        Ok(())
    }
}

/// Resolves locations for every sidecar named by `options` and returns the
/// run's statistics.
///
/// Configuration problems (bad options, missing catalog, unknown sources) are
/// returned as errors before any sidecar is touched; per-file problems end up
/// in the statistics' failure list.
pub async fn run(
    options: &RunOptions,
    config: &AppConfig,
    credentials: ProviderCredentials,
) -> AppResult<RunStatistics> {
    options.validate()?;
    for source in &options.source_folders {
        if !source.exists() {
            return Err(AppError::Path(format!(
                "source {} does not exist",
                source.display()
            )));
        }
    }

    let catalog = options
        .catalog_folder
        .as_ref()
        .map(|folder| LightroomCatalog::open(folder).map(|db| CatalogResolver::new(Box::new(db))))
        .transpose()?;
    let provider = build_provider(options.provider, config, &credentials)?;
    let store = XmpSidecarStore::new(
        options.source_folders.clone(),
        options.exclude_folders.clone(),
    )
    .with_test_mode(options.test_mode)
    .with_backup(!options.no_backup);

    let settings = EngineSettings {
        field_mode: options.field_mode.clone(),
        fuzzy_radius_meters: options.fuzzy_radius_meters,
        strict_catalog: options.strict,
    };
    let mut engine = ResolutionEngine::new(provider.as_ref(), settings);
    if let Some(catalog) = &catalog {
        engine = engine.with_catalog(catalog);
    }

    info!(
        target: "reverse_geolocate",
        provider = %options.provider,
        sources = options.source_folders.len(),
        catalog = options.catalog_folder.is_some(),
        test_mode = options.test_mode,
        "starting run"
    );
    let mut ctx = RunContext::new(config.coordinate_precision);
    engine.run(&mut ctx, &store, &store).await?;
    Ok(ctx.stats)
}

/// Installs the global subscriber once; `RUST_LOG` wins over `verbosity`.
pub fn init_tracing(verbosity: u8) {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let default_directive = match verbosity {
            0 => "warn,reverse_geolocate=info",
            1 => "info,reverse_geolocate=debug",
            _ => "debug,reverse_geolocate=trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
