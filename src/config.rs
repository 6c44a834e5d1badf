use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use tracing::debug;

use crate::provider::ProviderKind;

pub const DEFAULT_GOOGLE_GEOCODE_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_NOMINATIM_INTERVAL_MS: u64 = 1_000;
const DEFAULT_COORDINATE_PRECISION: u32 = 6;
const MAX_COORDINATE_PRECISION: u32 = 9;
const DEFAULT_FUZZY_RADIUS_METERS: f64 = 10.0;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_geocode_endpoint: String,
    pub nominatim_endpoint: String,
    pub geocode_timeout_secs: u64,
    pub geocode_min_interval_ms: Option<u64>,
    pub coordinate_precision: u32,
    pub fuzzy_radius_meters: f64,
    pub google_api_key: Option<SecretString>,
    pub openstreetmap_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            google_geocode_endpoint: env::var("GOOGLE_GEOCODE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_GEOCODE_ENDPOINT.to_string()),
            nominatim_endpoint: env::var("NOMINATIM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_NOMINATIM_ENDPOINT.to_string()),
            geocode_timeout_secs: parse_u64("GEOCODE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).max(1),
            geocode_min_interval_ms: env::var("GEOCODE_MIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok()),
            coordinate_precision: parse_u32("COORDINATE_PRECISION", DEFAULT_COORDINATE_PRECISION)
                .min(MAX_COORDINATE_PRECISION),
            fuzzy_radius_meters: parse_f64("FUZZY_RADIUS_METERS", DEFAULT_FUZZY_RADIUS_METERS),
            google_api_key: env::var("GOOGLE_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::new(v.into())),
            openstreetmap_email: env::var("OPENSTREETMAP_EMAIL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    pub fn min_request_interval(&self, provider: ProviderKind) -> Duration {
        let millis = self.geocode_min_interval_ms.unwrap_or(match provider {
            ProviderKind::Google => 0,
            ProviderKind::OpenStreetMap => DEFAULT_NOMINATIM_INTERVAL_MS,
        });
        Duration::from_millis(millis)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google_geocode_endpoint: DEFAULT_GOOGLE_GEOCODE_ENDPOINT.to_string(),
            nominatim_endpoint: DEFAULT_NOMINATIM_ENDPOINT.to_string(),
            geocode_timeout_secs: DEFAULT_TIMEOUT_SECS,
            geocode_min_interval_ms: None,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
            fuzzy_radius_meters: DEFAULT_FUZZY_RADIUS_METERS,
            google_api_key: None,
            openstreetmap_email: None,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
