//! # Configuration Module
//!
//! In-process dynamic settings service. Values are strings addressed by
//! `(section, key)`; typed getters parse and range-check on the way out.
//! Consumers that must track changes register a callback under an opaque
//! identity token and cancel it when they go away.
//!
//! ## Callback discipline
//!
//! [`ConfigService::set`] invokes matching callbacks synchronously on the
//! publisher's thread, after the value is stored. Callbacks must be cheap,
//! must not acquire their owner's locks, and must not re-enter the
//! registration APIs. A failing callback is logged and does not affect the
//! set operation or other callbacks.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorCode;

// ------------------------------------------------------------------------------------------------
// Keys and units
// ------------------------------------------------------------------------------------------------

/// Section holding accelerator-resource settings.
pub const SECTION_GPU_RESOURCE: &str = "gpu.resource";

/// Whether device caches accept new inserts. Boolean.
pub const KEY_GPU_ENABLE: &str = "enable";

/// Device cache capacity in GiB. Integer.
pub const KEY_GPU_CACHE_CAPACITY: &str = "cache_capacity";

/// Device cache free-memory watermark in `[0, 1]`. Float.
pub const KEY_GPU_CACHE_THRESHOLD: &str = "cache_threshold";

/// One binary gigabyte.
pub const GIB: u64 = 1 << 30;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by the [`ConfigService`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The `(section, key)` pair has no value.
    #[error("config key not found: {section}.{key}")]
    KeyNotFound { section: String, key: String },

    /// The stored value failed to parse as the requested type, or fell
    /// outside its valid range.
    #[error("invalid config value for {section}.{key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    /// Invariant violation or poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfigError {
    /// Classification of this error into the public code space.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfigError::KeyNotFound { .. } => ErrorCode::NotFound,
            ConfigError::InvalidValue { .. } => ErrorCode::InvalidArgument,
            ConfigError::Internal(_) => ErrorCode::Internal,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ConfigService
// ------------------------------------------------------------------------------------------------

/// Callback fired with the newly published value.
pub type ConfigCallback = Box<dyn Fn(&str) -> Result<(), ConfigError> + Send + Sync>;

/// In-process dynamic configuration with change callbacks.
pub struct ConfigService {
    /// `(section, key)` → value.
    values: RwLock<HashMap<(String, String), String>>,

    /// `(section, key, identity)` → callback.
    callbacks: Mutex<HashMap<(String, String, String), ConfigCallback>>,

    /// Source of unique identity tokens.
    identity_seq: AtomicU64,
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigService {
    /// Creates a service carrying the default accelerator settings:
    /// inserts enabled, 1 GiB capacity, 20% of capacity kept free.
    pub fn new() -> Self {
        let section = SECTION_GPU_RESOURCE.to_string();
        let mut values = HashMap::new();
        values.insert((section.clone(), KEY_GPU_ENABLE.into()), "true".into());
        values.insert((section.clone(), KEY_GPU_CACHE_CAPACITY.into()), "1".into());
        values.insert((section, KEY_GPU_CACHE_THRESHOLD.into()), "0.2".into());

        Self {
            values: RwLock::new(values),
            callbacks: Mutex::new(HashMap::new()),
            identity_seq: AtomicU64::new(0),
        }
    }

    /// Stores a value and fires every callback registered on
    /// `(section, key)` with the new value.
    pub fn set(&self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        {
            let mut values = self
                .values
                .write()
                .map_err(|_| ConfigError::Internal("RwLock poisoned".into()))?;
            values.insert((section.to_string(), key.to_string()), value.to_string());
        }
        debug!(%section, %key, %value, "config value published");

        let callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ConfigError::Internal("mutex poisoned".into()))?;
        for ((cb_section, cb_key, identity), callback) in callbacks.iter() {
            if cb_section == section && cb_key == key {
                if let Err(e) = callback(value) {
                    warn!(%section, %key, %identity, error = %e, "config callback failed");
                }
            }
        }

        Ok(())
    }

    /// Raw string lookup.
    pub fn get(&self, section: &str, key: &str) -> Result<String, ConfigError> {
        let values = self
            .values
            .read()
            .map_err(|_| ConfigError::Internal("RwLock poisoned".into()))?;
        values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Boolean lookup. Accepts `true`/`false`/`1`/`0` (case-insensitive).
    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool, ConfigError> {
        let value = self.get(section, key)?;
        parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value,
        })
    }

    /// Integer lookup.
    pub fn get_i64(&self, section: &str, key: &str) -> Result<i64, ConfigError> {
        let value = self.get(section, key)?;
        value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value,
        })
    }

    /// Float lookup.
    pub fn get_f64(&self, section: &str, key: &str) -> Result<f64, ConfigError> {
        let value = self.get(section, key)?;
        value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value,
        })
    }

    // --------------------------------------------------------------------------------------------
    // Typed accelerator accessors
    // --------------------------------------------------------------------------------------------

    /// Whether device caches accept new inserts.
    pub fn gpu_resource_enabled(&self) -> Result<bool, ConfigError> {
        self.get_bool(SECTION_GPU_RESOURCE, KEY_GPU_ENABLE)
    }

    /// Device cache capacity, converted from the published GiB figure to
    /// bytes.
    pub fn gpu_cache_capacity_bytes(&self) -> Result<u64, ConfigError> {
        let gib = self.get_i64(SECTION_GPU_RESOURCE, KEY_GPU_CACHE_CAPACITY)?;
        if gib < 0 {
            return Err(ConfigError::InvalidValue {
                section: SECTION_GPU_RESOURCE.to_string(),
                key: KEY_GPU_CACHE_CAPACITY.to_string(),
                value: gib.to_string(),
            });
        }
        Ok(gib as u64 * GIB)
    }

    /// Device cache free-memory watermark, range-checked into `[0, 1]`.
    pub fn gpu_cache_threshold(&self) -> Result<f64, ConfigError> {
        let threshold = self.get_f64(SECTION_GPU_RESOURCE, KEY_GPU_CACHE_THRESHOLD)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                section: SECTION_GPU_RESOURCE.to_string(),
                key: KEY_GPU_CACHE_THRESHOLD.to_string(),
                value: threshold.to_string(),
            });
        }
        Ok(threshold)
    }

    // --------------------------------------------------------------------------------------------
    // Callback registry
    // --------------------------------------------------------------------------------------------

    /// Mints a unique identity token for callback registration.
    pub fn generate_identity(&self, prefix: &str) -> String {
        let seq = self.identity_seq.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{seq}")
    }

    /// Registers `callback` to fire on every publish of `(section, key)`.
    /// A second registration under the same identity replaces the first.
    pub fn register_callback(
        &self,
        section: &str,
        key: &str,
        identity: &str,
        callback: ConfigCallback,
    ) -> Result<(), ConfigError> {
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ConfigError::Internal("mutex poisoned".into()))?;
        callbacks.insert(
            (section.to_string(), key.to_string(), identity.to_string()),
            callback,
        );
        Ok(())
    }

    /// Removes a registration. Cancelling an unknown identity is a no-op.
    pub fn cancel_callback(
        &self,
        section: &str,
        key: &str,
        identity: &str,
    ) -> Result<(), ConfigError> {
        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ConfigError::Internal("mutex poisoned".into()))?;
        callbacks.remove(&(section.to_string(), key.to_string(), identity.to_string()));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn callback_count(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Lenient boolean parse shared by `get_bool` and the device-enable
/// callback.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}
