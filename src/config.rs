use crate::error::{WalletError, WalletErrorKind};
use wasm_bindgen::JsValue;

pub const DEFAULT_STORAGE_KEY: &str = "walletName";

/// Settings of the [`WalletManager`](crate::WalletManager).
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    /// key of the storage slot remembering the selected wallet
    pub storage_key: String,
    /// reconnect to the remembered wallet on start up
    pub auto_connect: bool,
}

/// Settings of the scoped polling readiness detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    pub interval_ms: u32,
    /// number of interval ticks before giving up
    pub attempts: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            auto_connect: false,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            attempts: 3,
        }
    }
}

impl ManagerConfig {
    /// read the configuration from a plain JavaScript object, missing fields
    /// take their default value
    pub fn from_js(value: JsValue) -> Result<Self, WalletError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value).map_err(|error| {
            WalletError::new(
                WalletErrorKind::Config,
                format!("Invalid manager configuration: {error}"),
            )
        })
    }
}

impl DetectorConfig {
    pub fn from_js(value: JsValue) -> Result<Self, WalletError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value).map_err(|error| {
            WalletError::new(
                WalletErrorKind::Config,
                format!("Invalid detector configuration: {error}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manager_config_defaults() {
        let config: ManagerConfig = serde_json::from_value(json! { {} }).unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.storage_key, "walletName");
        assert!(!config.auto_connect);
    }

    #[test]
    fn manager_config_json() {
        let config: ManagerConfig = serde_json::from_value(json! { {
            "storageKey": "myApp.wallet",
            "autoConnect": true,
        }})
        .unwrap();
        assert_eq!(config.storage_key, "myApp.wallet");
        assert!(config.auto_connect);
    }

    #[test]
    fn detector_config_partial_json() {
        let config: DetectorConfig = serde_json::from_value(json! { {
            "attempts": 10,
        }})
        .unwrap();
        assert_eq!(
            config,
            DetectorConfig {
                interval_ms: 1_000,
                attempts: 10
            }
        );
    }
}
