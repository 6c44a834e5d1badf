use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geo::GeoCoordinate;
use crate::secrets::ProviderCredentials;

const USER_AGENT: &str = concat!("reverse-geolocate/", env!("CARGO_PKG_VERSION"));
const GOOGLE_RESULT_TYPES: &[&str] = &["premise", "route", "street_address", "sublocality"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    OpenStreetMap,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenStreetMap => "openstreetmap",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressComponent {
    pub kind: String,
    pub value: String,
    pub short_value: Option<String>,
}

impl AddressComponent {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            short_value: None,
        }
    }

    pub fn with_short_value(mut self, short_value: impl Into<String>) -> Self {
        self.short_value = Some(short_value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Success(Vec<AddressComponent>),
    Error(String),
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn reverse(&self, coordinate: GeoCoordinate) -> ProviderResult;
}

pub fn build_provider(
    kind: ProviderKind,
    config: &AppConfig,
    credentials: &ProviderCredentials,
) -> AppResult<Box<dyn GeocodingProvider>> {
    let http = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .build()?;
    let limiter = RateLimiter::new(config.min_request_interval(kind));
    let provider: Box<dyn GeocodingProvider> = match kind {
        ProviderKind::Google => Box::new(GoogleGeocoder {
            http,
            endpoint: config.google_geocode_endpoint.clone(),
            api_key: credentials.google_api_key.clone(),
            limiter,
        }),
        ProviderKind::OpenStreetMap => Box::new(NominatimGeocoder {
            http,
            endpoint: config.nominatim_endpoint.clone(),
            email: credentials.openstreetmap_email.clone(),
            limiter,
        }),
    };
    Ok(provider)
}

struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

struct GoogleGeocoder {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    limiter: RateLimiter,
}

impl GoogleGeocoder {
    async fn fetch(&self, coordinate: GeoCoordinate) -> AppResult<ProviderResult> {
        #[derive(Deserialize)]
        struct Response {
            status: String,
            #[serde(default)]
            error_message: Option<String>,
            #[serde(default)]
            results: Vec<ResponseResult>,
        }

        #[derive(Deserialize)]
        struct ResponseResult {
            #[serde(default)]
            types: Vec<String>,
            #[serde(default)]
            address_components: Vec<ResponseComponent>,
        }

        #[derive(Deserialize)]
        struct ResponseComponent {
            long_name: String,
            short_name: String,
            #[serde(default)]
            types: Vec<String>,
        }

        let mut query = vec![
            (
                "latlng",
                format!("{},{}", coordinate.latitude(), coordinate.longitude()),
            ),
            ("language", "en".to_string()),
            ("sensor", "false".to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.expose_secret().to_string()));
        }

        self.limiter.wait().await;
        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let parsed: Response = response.json().await?;
        trace!(
            target: "geocoder",
            status = %parsed.status,
            results = parsed.results.len(),
            "google response"
        );

        if parsed.status != "OK" {
            let message = match parsed.error_message.filter(|m| !m.is_empty()) {
                Some(message) => format!("{}: {}", parsed.status, message),
                None => parsed.status,
            };
            return Ok(ProviderResult::Error(message));
        }

        let preferred = parsed
            .results
            .iter()
            .any(|result| is_preferred_result(&result.types));
        let components = parsed
            .results
            .iter()
            .filter(|result| !preferred || is_preferred_result(&result.types))
            .flat_map(|result| result.address_components.iter())
            .flat_map(|component| {
                component.types.iter().map(|kind| {
                    AddressComponent::new(kind.as_str(), component.long_name.as_str())
                        .with_short_value(component.short_name.as_str())
                })
            })
            .collect();
        Ok(ProviderResult::Success(components))
    }
}

fn is_preferred_result(types: &[String]) -> bool {
    types
        .iter()
        .any(|kind| GOOGLE_RESULT_TYPES.contains(&kind.as_str()))
}

#[async_trait]
impl GeocodingProvider for GoogleGeocoder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn reverse(&self, coordinate: GeoCoordinate) -> ProviderResult {
        debug!(target: "geocoder", provider = "google", %coordinate, "reverse geocode request");
        self.fetch(coordinate).await.unwrap_or_else(|err| {
            warn!(target: "geocoder", ?err, "google geocode request failed");
            ProviderResult::Error(err.to_string())
        })
    }
}

struct NominatimGeocoder {
    http: Client,
    endpoint: String,
    email: Option<String>,
    limiter: RateLimiter,
}

impl NominatimGeocoder {
    async fn fetch(&self, coordinate: GeoCoordinate) -> AppResult<ProviderResult> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            error: Option<Value>,
            #[serde(default)]
            address: Option<serde_json::Map<String, Value>>,
        }

        let mut query = vec![
            ("format", "jsonv2".to_string()),
            ("lat", coordinate.latitude().to_string()),
            ("lon", coordinate.longitude().to_string()),
            ("accept-language", "en-US,en".to_string()),
        ];
        if let Some(email) = &self.email {
            query.push(("email", email.clone()));
        }

        self.limiter.wait().await;
        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let parsed: Response = response.json().await?;

        if let Some(error) = parsed.error {
            let message = match error {
                Value::String(text) => text,
                Value::Object(map) => {
                    let message = map.get("message").and_then(Value::as_str).map(str::to_string);
                    message.unwrap_or_else(|| Value::Object(map).to_string())
                }
                other => other.to_string(),
            };
            return Ok(ProviderResult::Error(message));
        }

        let components = parsed
            .address
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(kind, value)| match value {
                Value::String(text) => Some(AddressComponent::new(kind, text)),
                _ => None,
            })
            .collect();
        Ok(ProviderResult::Success(components))
    }
}

#[async_trait]
impl GeocodingProvider for NominatimGeocoder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenStreetMap
    }

    async fn reverse(&self, coordinate: GeoCoordinate) -> ProviderResult {
        debug!(
            target: "geocoder",
            provider = "openstreetmap",
            %coordinate,
            "reverse geocode request"
        );
        self.fetch(coordinate).await.unwrap_or_else(|err| {
            warn!(target: "geocoder", ?err, "nominatim request failed");
            ProviderResult::Error(err.to_string())
        })
    }
}
