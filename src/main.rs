use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use secrecy::SecretString;
use tracing::{info, warn};

use reverse_geolocate::secrets::SERVICE_NAME;
use reverse_geolocate::{
    init_tracing, run, AppConfig, CredentialStore, FieldMode, ProviderCredentials, ProviderKind,
    RunOptions,
};

/// Fill missing location names in XMP sidecars from their GPS coordinates
#[derive(Parser, Debug)]
#[command(name = "reverse-geolocate")]
#[command(version)]
struct Args {
    /// Sidecar folders or single .xmp files to process
    #[arg(
        short = 'i',
        long = "include-source",
        value_name = "PATH",
        required = true,
        num_args = 1..
    )]
    include_source: Vec<PathBuf>,

    /// Folders or files to leave out
    #[arg(short = 'x', long = "exclude-source", value_name = "PATH", num_args = 1..)]
    exclude_source: Vec<PathBuf>,

    /// Folder holding the Lightroom catalog (*.lrcat)
    #[arg(short = 'l', long = "lightroom", value_name = "DIR")]
    lightroom: Option<PathBuf>,

    /// Catalog matches must also agree on the folder
    #[arg(short = 's', long)]
    strict: bool,

    /// default, overwrite, location, city, state, country or countrycode
    #[arg(short = 'f', long = "field", value_name = "WORD")]
    field: Vec<String>,

    /// Reuse results for coordinates within METERS of an earlier lookup
    #[arg(short = 'd', long = "fuzzy-cache", value_name = "METERS", num_args = 0..=1)]
    fuzzy_cache: Option<Option<f64>>,

    /// Use OpenStreetMap instead of Google
    #[arg(short = 'o', long = "openstreetmap")]
    openstreetmap: bool,

    /// Google Maps API key
    #[arg(short = 'g', long = "google", value_name = "KEY")]
    google: Option<String>,

    /// Contact e-mail sent to OpenStreetMap
    #[arg(short = 'e', long = "email", value_name = "ADDR")]
    email: Option<String>,

    /// Store the given key and e-mail in the system keychain
    #[arg(short = 'w', long = "write-credentials")]
    write_credentials: bool,

    /// Do not keep a .BK copy of changed sidecars
    #[arg(short = 'n', long = "nobackup")]
    no_backup: bool,

    /// Resolve everything but write nothing
    #[arg(short = 't', long = "test")]
    test: bool,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(if args.debug { 2 } else { args.verbose });

    let config = AppConfig::from_env();
    let field_mode = FieldMode::from_words(&args.field).context("invalid --field value")?;
    let provider = if args.openstreetmap {
        ProviderKind::OpenStreetMap
    } else {
        ProviderKind::Google
    };

    let cli_credentials = ProviderCredentials {
        google_api_key: args.google.clone().map(|key| SecretString::new(key.into())),
        openstreetmap_email: args.email.clone(),
    };
    let store = CredentialStore::new(SERVICE_NAME);
    if args.write_credentials {
        if cli_credentials.google_api_key.is_none()
            && cli_credentials.openstreetmap_email.is_none()
        {
            bail!("--write-credentials needs --google and/or --email");
        }
        store
            .save(&cli_credentials)
            .context("failed to store credentials in the keychain")?;
        info!("credentials stored in the keychain");
    }

    let mut credentials = cli_credentials.or(ProviderCredentials::from_config(&config));
    if credentials.google_api_key.is_none() || credentials.openstreetmap_email.is_none() {
        match store.load() {
            Ok(stored) => credentials = credentials.or(stored),
            Err(err) => warn!(
                error = %err,
                "keychain unavailable, continuing without stored credentials"
            ),
        }
    }

    let options = RunOptions {
        source_folders: args.include_source,
        exclude_folders: args.exclude_source,
        catalog_folder: args.lightroom,
        strict: args.strict,
        field_mode,
        fuzzy_radius_meters: args
            .fuzzy_cache
            .map(|radius| radius.unwrap_or(config.fuzzy_radius_meters)),
        provider,
        test_mode: args.test,
        no_backup: args.no_backup,
    };

    let stats = run(&options, &config, credentials)
        .await
        .context("reverse geolocation run failed")?;
    print!("{stats}");
    Ok(())
}
