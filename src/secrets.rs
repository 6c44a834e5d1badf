#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

pub const SERVICE_NAME: &str = "reverse-geolocate";
pub const GOOGLE_API_KEY_ACCOUNT: &str = "google-api-key";
pub const OPENSTREETMAP_EMAIL_ACCOUNT: &str = "openstreetmap-email";

/// Credentials handed to the geocoding adapters.
#[derive(Clone, Debug, Default)]
pub struct ProviderCredentials {
    pub google_api_key: Option<SecretString>,
    pub openstreetmap_email: Option<String>,
}

impl ProviderCredentials {
    /// Fills every missing credential from the next source, keeping what is set.
    pub fn or(self, fallback: ProviderCredentials) -> Self {
        Self {
            google_api_key: self.google_api_key.or(fallback.google_api_key),
            openstreetmap_email: self.openstreetmap_email.or(fallback.openstreetmap_email),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            google_api_key: config.google_api_key.clone(),
            openstreetmap_email: config.openstreetmap_email.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    service_name: String,
    backend: SecretBackend,
}

#[derive(Clone)]
enum SecretBackend {
    Keyring,
    #[cfg(test)]
    Memory(Arc<Mutex<HashMap<String, SecretString>>>),
}

impl CredentialStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            backend: SecretBackend::Keyring,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            service_name: "in-memory".to_string(),
            backend: SecretBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    pub fn load(&self) -> AppResult<ProviderCredentials> {
        let google_api_key = self.try_get(GOOGLE_API_KEY_ACCOUNT)?;
        let openstreetmap_email = self
            .try_get(OPENSTREETMAP_EMAIL_ACCOUNT)?
            .map(|secret| secret.expose_secret().to_string());
        debug!(
            target: "credential_store",
            service = %self.service_name,
            has_google_key = google_api_key.is_some(),
            has_email = openstreetmap_email.is_some(),
            "loaded provider credentials"
        );
        Ok(ProviderCredentials {
            google_api_key,
            openstreetmap_email,
        })
    }

    /// Writes every credential that is present; absent ones are left untouched.
    pub fn save(&self, credentials: &ProviderCredentials) -> AppResult<()> {
        if let Some(key) = &credentials.google_api_key {
            self.store(GOOGLE_API_KEY_ACCOUNT, key)?;
        }
        if let Some(email) = &credentials.openstreetmap_email {
            if !email.contains('@') {
                return Err(AppError::Config(format!(
                    "not a valid contact e-mail: {email}"
                )));
            }
            self.store(
                OPENSTREETMAP_EMAIL_ACCOUNT,
                &SecretString::new(email.clone().into()),
            )?;
        }
        info!(
            target: "credential_store",
            service = %self.service_name,
            "stored provider credentials"
        );
        Ok(())
    }

    fn try_get(&self, account: &str) -> AppResult<Option<SecretString>> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                match entry.get_password() {
                    Ok(value) => Ok(Some(SecretString::new(value.into()))),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => Ok(store.lock().get(account).cloned()),
        }
    }

    fn store(&self, account: &str, secret: &SecretString) -> AppResult<()> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                entry.set_password(secret.expose_secret())?;
                Ok(())
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => {
                store.lock().insert(account.to_string(), secret.clone());
                Ok(())
            }
        }
    }
}
