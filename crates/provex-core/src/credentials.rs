//! Vendor credentials, held per provider and never printed.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Credential fields for one provider, e.g. `api_key`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ProviderCredentials {
    fields: BTreeMap<String, String>,
}

impl ProviderCredentials {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn has_all<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|field| self.get(field.as_ref()).is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Debug for ProviderCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for key in self.fields.keys() {
            map.entry(key, &"***");
        }
        map.finish()
    }
}

/// Credentials for every configured provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    providers: BTreeMap<String, ProviderCredentials>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of one field.
    pub fn with(mut self, provider: &str, field: &str, value: impl Into<String>) -> Self {
        self.insert(provider, field, value);
        self
    }

    pub fn insert(&mut self, provider: &str, field: &str, value: impl Into<String>) {
        self.providers
            .entry(provider.to_owned())
            .or_default()
            .insert(field, value);
    }

    pub fn provider(&self, provider: &str) -> Option<&ProviderCredentials> {
        self.providers.get(provider)
    }

    /// True when every `required` field is present and non-empty.
    pub fn satisfies<S: AsRef<str>>(&self, provider: &str, required: &[S]) -> bool {
        if required.is_empty() {
            return true;
        }
        self.providers
            .get(provider)
            .is_some_and(|fields| fields.has_all(required))
    }

    /// Read credentials from the process environment.
    ///
    /// For provider `fred` and field `api_key` the lookup order is
    /// `PROVEX_FRED_API_KEY`, then `FRED_API_KEY`.
    pub fn from_env<'a, I>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        Self::from_lookup(requirements, |key| std::env::var(key).ok())
    }

    /// Same as [`Credentials::from_env`] with a custom variable source.
    pub fn from_lookup<'a, I, L>(requirements: I, lookup: L) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
        L: Fn(&str) -> Option<String>,
    {
        let mut credentials = Self::new();
        for (provider, fields) in requirements {
            for field in fields {
                let suffix = format!("{provider}_{field}").to_ascii_uppercase();
                let value = lookup(&format!("PROVEX_{suffix}"))
                    .or_else(|| lookup(&suffix))
                    .filter(|value| !value.trim().is_empty());
                if let Some(value) = value {
                    credentials.insert(provider, field, value);
                }
            }
        }
        credentials
    }

    /// Load `{"provider": {"field": "value"}}` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        })
    }

    /// Overlay `other` on top of `self`; fields in `other` win.
    pub fn merge(mut self, other: Credentials) -> Self {
        for (provider, fields) in other.providers {
            let target = self.providers.entry(provider).or_default();
            for (field, value) in fields.fields {
                target.insert(field, value);
            }
        }
        self
    }
}
