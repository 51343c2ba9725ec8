use crate::error::{WalletError, WalletErrorKind};
use std::{fmt, str::FromStr};

/// A wallet account public key (32 bytes), displayed in base58.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

/// A 64 bytes signature, either of a message or of a transaction (in which
/// case it doubles as the transaction identifier).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature([u8; 64]);

impl PublicKey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl Signature {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 64] {
        self.0
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_string()).finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signature").field(&self.to_string()).finish()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = WalletError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes = <[u8; 32]>::try_from(bytes).map_err(|_| {
            WalletError::new(
                WalletErrorKind::PublicKey,
                format!("expected 32 bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = WalletError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes = <[u8; 64]>::try_from(bytes).map_err(|_| {
            WalletError::new(
                WalletErrorKind::SignMessage,
                format!("expected a 64 bytes signature, got {}", bytes.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl FromStr for PublicKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|error| {
            WalletError::new(
                WalletErrorKind::PublicKey,
                format!("invalid public key `{s}': {error}"),
            )
        })?;
        Self::try_from(bytes.as_slice())
    }
}

impl FromStr for Signature {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec().map_err(|error| {
            WalletError::new(
                WalletErrorKind::SendTransaction,
                format!("invalid signature `{s}': {error}"),
            )
        })?;
        Self::try_from(bytes.as_slice())
    }
}

impl serde::Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
