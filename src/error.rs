use wasm_bindgen::JsValue;

/// The kind of failure a wallet operation ran into.
///
/// Adapters map whatever their vendor returns onto one of these so the
/// application only has to reason about a single taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum WalletErrorKind {
    #[error("Wallet not found")]
    NotFound,
    #[error("Wallet found but it is not the expected provider")]
    NotInstalled,
    #[error("Wallet is not ready")]
    NotReady,
    #[error("No wallet selected")]
    NotSelected,
    #[error("Wallet could not be loaded")]
    Load,
    #[error("Wallet adapter is misconfigured")]
    Config,
    #[error("Connection to the wallet failed")]
    Connection,
    #[error("Disconnecting from the wallet failed")]
    Disconnection,
    #[error("Wallet returned no usable account")]
    Account,
    #[error("Invalid public key")]
    PublicKey,
    #[error("Transaction signing failed")]
    SignTransaction,
    #[error("Message signing failed")]
    SignMessage,
    #[error("Sending the transaction failed")]
    SendTransaction,
    #[error("The wallet window was closed")]
    WindowClosed,
    #[error("The wallet window was blocked")]
    WindowBlocked,
    #[error("Wallet not connected")]
    NotConnected,
    #[error("Wallet request timed out")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{}{}", .kind, info_suffix(.info))]
pub struct WalletError {
    pub kind: WalletErrorKind,
    pub info: String,
}

fn info_suffix(info: &str) -> String {
    if info.is_empty() {
        String::new()
    } else {
        format!(". {info}.")
    }
}

impl WalletError {
    pub fn new(kind: WalletErrorKind, info: impl Into<String>) -> Self {
        Self {
            kind,
            info: info.into(),
        }
    }

    pub fn kind(&self) -> WalletErrorKind {
        self.kind
    }

    /// keep the message but re-classify the error
    ///
    /// Used when an error crosses into an operation with its own kind, e.g.
    /// a provider error returned from `signTransaction`.
    pub fn with_kind(self, kind: WalletErrorKind) -> Self {
        Self { kind, ..self }
    }
}

impl From<WalletErrorKind> for WalletError {
    fn from(kind: WalletErrorKind) -> Self {
        Self::new(kind, "")
    }
}

/// Error codes thrown by injected providers (EIP-1193 style numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, thiserror::Error)]
pub enum ProviderErrorCode {
    #[error("The user rejected the request")]
    UserRejected,
    #[error("The requested method or account has not been authorized by the user")]
    Unauthorized,
    #[error("The provider does not support the requested method")]
    UnsupportedMethod,
    #[error("The provider is disconnected")]
    Disconnected,
    #[error("The provider is not connected to the requested chain")]
    ChainDisconnected,
    #[error("Invalid input")]
    InvalidInput,
    #[default]
    #[error("An error occured inside the provider")]
    InternalError,
    #[error("Unknown error code `{0}'")]
    Unknown(i64),
}

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error, serde::Deserialize,
)]
#[error("{code}. {message}.")]
pub struct ProviderError {
    #[serde(default)]
    pub code: ProviderErrorCode,
    #[serde(default)]
    pub message: String,
}

impl ProviderError {
    /// Decode the value a provider promise rejected with and classify it
    /// under `kind`.
    ///
    /// Providers throw anything from a plain string to an `Error` carrying a
    /// numeric `code`, the decoding never fails: unknown shapes are kept as
    /// their debug representation.
    pub fn from_js(kind: WalletErrorKind, error: JsValue) -> WalletError {
        if let Some(message) = error.as_string() {
            return WalletError::new(kind, message);
        }

        match serde_wasm_bindgen::from_value::<ProviderError>(error.clone()) {
            Ok(provider_error) => provider_error.into_wallet_error(kind),
            Err(decode_error) => WalletError::new(
                kind,
                format!("Couldn't decode the error content: {decode_error} ({error:?})"),
            ),
        }
    }

    pub fn into_wallet_error(self, kind: WalletErrorKind) -> WalletError {
        WalletError::new(kind, self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ProviderErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;
        impl serde::de::Visitor<'_> for Visitor {
            type Value = ProviderErrorCode;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "Expecting an integer ProviderErrorCode")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    4001 => Ok(ProviderErrorCode::UserRejected),
                    4100 => Ok(ProviderErrorCode::Unauthorized),
                    4200 => Ok(ProviderErrorCode::UnsupportedMethod),
                    4900 => Ok(ProviderErrorCode::Disconnected),
                    4901 => Ok(ProviderErrorCode::ChainDisconnected),
                    -32000 => Ok(ProviderErrorCode::InvalidInput),
                    -32603 => Ok(ProviderErrorCode::InternalError),
                    unknown => Ok(ProviderErrorCode::Unknown(unknown)),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match i64::try_from(v) {
                    Ok(v) => self.visit_i64(v),
                    Err(_) => Err(E::custom(format!("error code out of range: {v}"))),
                }
            }

            // JavaScript numbers reach us as floats
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.fract() == 0.0 && v.is_finite() {
                    self.visit_i64(v as i64)
                } else {
                    Err(E::custom(format!("error code is not an integer: {v}")))
                }
            }
        }

        deserializer.deserialize_i64(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn provider_error_code_json() {
        assert_eq!(
            serde_json::from_value::<ProviderErrorCode>(json! { 4001 }).unwrap(),
            ProviderErrorCode::UserRejected
        );
        assert_eq!(
            serde_json::from_value::<ProviderErrorCode>(json! { 4100 }).unwrap(),
            ProviderErrorCode::Unauthorized
        );
        assert_eq!(
            serde_json::from_value::<ProviderErrorCode>(json! { 4900 }).unwrap(),
            ProviderErrorCode::Disconnected
        );
        assert_eq!(
            serde_json::from_value::<ProviderErrorCode>(json! { -32603 }).unwrap(),
            ProviderErrorCode::InternalError
        );
        assert_eq!(
            serde_json::from_value::<ProviderErrorCode>(json! { -42 }).unwrap(),
            ProviderErrorCode::Unknown(-42)
        );
    }

    #[test]
    fn provider_error_json() {
        assert_eq!(
            serde_json::from_value::<ProviderError>(json! { {
                "code": 4001,
                "message": "User rejected the request.",
            }})
            .unwrap(),
            ProviderError {
                code: ProviderErrorCode::UserRejected,
                message: "User rejected the request.".to_owned()
            }
        );

        // plain `Error` objects carry no code
        assert_eq!(
            serde_json::from_value::<ProviderError>(json! { {
                "message": "Something broke",
            }})
            .unwrap(),
            ProviderError {
                code: ProviderErrorCode::InternalError,
                message: "Something broke".to_owned()
            }
        );
    }

    #[test]
    fn provider_error_keeps_the_operation_kind() {
        let error = ProviderError {
            code: ProviderErrorCode::UserRejected,
            message: "nope".to_owned(),
        }
        .into_wallet_error(WalletErrorKind::SignTransaction);

        assert_eq!(error.kind(), WalletErrorKind::SignTransaction);
        assert!(error.info.contains("The user rejected the request"));
    }

    #[test]
    fn wallet_error_display() {
        assert_eq!(
            WalletError::from(WalletErrorKind::NotSelected).to_string(),
            "No wallet selected"
        );
        assert_eq!(
            WalletError::new(WalletErrorKind::Load, "import failed").to_string(),
            "Wallet could not be loaded. import failed."
        );
    }
}
