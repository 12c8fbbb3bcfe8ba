//! Merchant configuration.
//!
//! Builders take a [`Configuration`] explicitly. Any field left unset falls
//! back to the process-wide defaults registered with [`set_defaults`] and
//! friends. The defaults are read once, when a builder is constructed.
//!
//! Changing the defaults while requests are being built on other threads is
//! allowed but racy: a builder sees either the old or the new value for each
//! field. Set them once at startup.

use crate::checksum::Secret;
use crate::errors::{QuickpayError, Result};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Standard QuickPay API endpoint.
pub const DEFAULT_API_URL: &str = "https://secure.quickpay.dk/api";

/// Standard hosted payment window endpoint.
pub const DEFAULT_FORM_URL: &str = "https://secure.quickpay.dk/form/";

/// Merchant credentials and endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Merchant id at QuickPay (the "QuickPayID")
    pub merchant_id: Option<u64>,

    /// Shared MD5 secret from the QuickPay manager
    pub secret: Option<Secret>,

    /// API key, only needed when the calling IP is not whitelisted
    pub api_key: Option<String>,

    /// Alternate API endpoint
    pub api_url: Option<Url>,

    /// Alternate hosted form endpoint
    pub form_url: Option<Url>,
}

static DEFAULTS: RwLock<Configuration> = RwLock::new(Configuration::empty());

fn read_defaults() -> RwLockReadGuard<'static, Configuration> {
    DEFAULTS.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_defaults() -> RwLockWriteGuard<'static, Configuration> {
    DEFAULTS.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Configuration {
    /// A configuration with nothing set; every field falls back to the defaults.
    pub const fn empty() -> Self {
        Self {
            merchant_id: None,
            secret: None,
            api_key: None,
            api_url: None,
            form_url: None,
        }
    }

    /// Creates a configuration for a merchant.
    ///
    /// # Examples
    ///
    /// ```
    /// use quickpay::config::Configuration;
    ///
    /// let config = Configuration::new(12345, "s3cr3t")
    ///     .with_api_key("key");
    /// assert_eq!(config.merchant_id, Some(12345));
    /// ```
    pub fn new(merchant_id: u64, secret: impl Into<Secret>) -> Self {
        Self {
            merchant_id: Some(merchant_id),
            secret: Some(secret.into()),
            ..Self::empty()
        }
    }

    /// Sets the merchant id.
    pub fn with_merchant_id(mut self, merchant_id: u64) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    /// Sets the shared secret.
    pub fn with_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets an alternate API endpoint.
    pub fn with_api_url(mut self, url: &str) -> Result<Self> {
        self.api_url = Some(Url::parse(url)?);
        Ok(self)
    }

    /// Sets an alternate hosted form endpoint.
    pub fn with_form_url(mut self, url: &str) -> Result<Self> {
        self.form_url = Some(Url::parse(url)?);
        Ok(self)
    }

    /// Reads `QUICKPAY_MERCHANT_ID`, `QUICKPAY_SECRET`, `QUICKPAY_API_KEY`,
    /// `QUICKPAY_API_URL` and `QUICKPAY_FORM_URL`. Unset variables stay `None`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::empty();

        if let Some(raw) = lookup("QUICKPAY_MERCHANT_ID") {
            let id = raw.trim().parse::<u64>().map_err(|e| {
                QuickpayError::ConfigurationError(format!(
                    "QUICKPAY_MERCHANT_ID is not a merchant id: {}",
                    e
                ))
            })?;
            config.merchant_id = Some(id);
        }
        config.secret = lookup("QUICKPAY_SECRET").map(Secret::from);
        config.api_key = lookup("QUICKPAY_API_KEY");
        if let Some(url) = lookup("QUICKPAY_API_URL") {
            config = config.with_api_url(&url)?;
        }
        if let Some(url) = lookup("QUICKPAY_FORM_URL") {
            config = config.with_form_url(&url)?;
        }

        Ok(config)
    }

    /// Fills unset fields from the process-wide defaults and checks that a
    /// merchant id and a secret are available.
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig> {
        self.resolve_with(&read_defaults())
    }

    fn resolve_with(&self, defaults: &Configuration) -> Result<ResolvedConfig> {
        let merchant_id = self.merchant_id.or(defaults.merchant_id).ok_or_else(|| {
            QuickpayError::ConfigurationError("no merchant id configured".to_string())
        })?;

        let secret = self
            .secret
            .as_ref()
            .or(defaults.secret.as_ref())
            .filter(|secret| !secret.is_empty())
            .cloned()
            .ok_or_else(|| {
                QuickpayError::ConfigurationError("no md5 secret configured".to_string())
            })?;

        let api_url = match self.api_url.as_ref().or(defaults.api_url.as_ref()) {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_API_URL)?,
        };
        let form_url = match self.form_url.as_ref().or(defaults.form_url.as_ref()) {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_FORM_URL)?,
        };

        Ok(ResolvedConfig {
            merchant_id,
            secret,
            api_key: self.api_key.clone().or_else(|| defaults.api_key.clone()),
            api_url,
            form_url,
        })
    }
}

/// A configuration with every required value present.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedConfig {
    pub merchant_id: u64,
    pub secret: Secret,
    pub api_key: Option<String>,
    pub api_url: Url,
    pub form_url: Url,
}

/// Returns a copy of the process-wide defaults.
pub fn defaults() -> Configuration {
    read_defaults().clone()
}

/// Replaces all process-wide defaults.
pub fn set_defaults(config: Configuration) {
    *write_defaults() = config;
}

/// Sets the default merchant id.
pub fn set_default_merchant_id(merchant_id: u64) {
    write_defaults().merchant_id = Some(merchant_id);
}

/// Sets the default shared secret.
pub fn set_default_secret(secret: impl Into<Secret>) {
    write_defaults().secret = Some(secret.into());
}

/// Sets the default API key.
pub fn set_default_api_key(api_key: impl Into<String>) {
    write_defaults().api_key = Some(api_key.into());
}

/// Clears every process-wide default.
pub fn reset_defaults() {
    set_defaults(Configuration::empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_builders() {
        let config = Configuration::new(42, "secret")
            .with_api_key("key")
            .with_api_url("https://gateway.test/api")
            .unwrap();

        assert_eq!(config.merchant_id, Some(42));
        assert_eq!(config.secret, Some(Secret::new("secret")));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.api_url.unwrap().as_str(), "https://gateway.test/api");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = Configuration::new(42, "secret").with_form_url("::nope").unwrap_err();
        assert!(matches!(err, QuickpayError::UrlParseError(_)));
    }

    #[test]
    fn test_resolve_prefers_explicit_values() {
        let defaults = Configuration::new(1, "default-secret").with_api_key("default-key");
        let resolved = Configuration::new(2, "own-secret")
            .resolve_with(&defaults)
            .unwrap();

        assert_eq!(resolved.merchant_id, 2);
        assert_eq!(resolved.secret.expose(), "own-secret");
        assert_eq!(resolved.api_key.as_deref(), Some("default-key"));
        assert_eq!(resolved.api_url.as_str(), DEFAULT_API_URL);
        assert_eq!(resolved.form_url.as_str(), DEFAULT_FORM_URL);
    }

    #[test]
    fn test_resolve_falls_back_per_field() {
        let defaults = Configuration::new(1, "default-secret");
        let resolved = Configuration::empty()
            .with_secret("own-secret")
            .resolve_with(&defaults)
            .unwrap();

        assert_eq!(resolved.merchant_id, 1);
        assert_eq!(resolved.secret.expose(), "own-secret");
        assert_eq!(resolved.api_key, None);
    }

    #[test]
    fn test_resolve_requires_merchant_and_secret() {
        let err = Configuration::empty()
            .with_secret("s")
            .resolve_with(&Configuration::empty())
            .unwrap_err();
        assert!(matches!(err, QuickpayError::ConfigurationError(_)));

        let err = Configuration::empty()
            .with_merchant_id(1)
            .resolve_with(&Configuration::empty())
            .unwrap_err();
        assert!(matches!(err, QuickpayError::ConfigurationError(_)));

        let err = Configuration::new(1, "")
            .resolve_with(&Configuration::empty())
            .unwrap_err();
        assert!(matches!(err, QuickpayError::ConfigurationError(_)));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("QUICKPAY_MERCHANT_ID", " 12345 "),
            ("QUICKPAY_SECRET", "s3cr3t"),
            ("QUICKPAY_FORM_URL", "https://form.test/"),
        ]
        .into_iter()
        .collect();

        let config =
            Configuration::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.merchant_id, Some(12345));
        assert_eq!(config.secret, Some(Secret::new("s3cr3t")));
        assert_eq!(config.api_key, None);
        assert_eq!(config.api_url, None);
        assert_eq!(config.form_url.unwrap().as_str(), "https://form.test/");
    }

    #[test]
    fn test_from_lookup_rejects_bad_merchant_id() {
        let err = Configuration::from_lookup(|name| {
            (name == "QUICKPAY_MERCHANT_ID").then(|| "merchant-one".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, QuickpayError::ConfigurationError(_)));
    }
}
