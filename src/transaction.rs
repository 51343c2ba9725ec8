use crate::{error::WalletError, key::Signature};
use async_trait::async_trait;
use std::{collections::BTreeSet, fmt};

/// The transaction message format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransactionVersion {
    Legacy,
    V0,
}

/// `None` means the wallet only knows about [`TransactionVersion::Legacy`].
pub type SupportedTransactionVersions = Option<BTreeSet<TransactionVersion>>;

/// A serialized transaction, opaque to this crate.
///
/// The bytes are whatever the wallet expects to receive, only the version is
/// inspected so we can refuse a versioned transaction before handing it to a
/// wallet that cannot deal with it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Transaction {
    version: TransactionVersion,
    bytes: Vec<u8>,
}

impl Transaction {
    pub fn new(version: TransactionVersion, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            version,
            bytes: bytes.into(),
        }
    }

    pub fn legacy(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionVersion::Legacy, bytes)
    }

    pub fn versioned(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(TransactionVersion::V0, bytes)
    }

    pub fn version(&self) -> TransactionVersion {
        self.version
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// same version, new content (e.g. once signed)
    pub fn with_bytes(&self, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(self.version, bytes)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("version", &self.version)
            .field("bytes", &hex::encode(&self.bytes))
            .finish()
    }
}

/// Options forwarded to the node when submitting a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub skip_preflight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_context_slot: Option<u64>,
}

/// Submits already signed transactions to the network.
///
/// Adapters that can only sign go through this to implement
/// `send_transaction`.
#[async_trait(?Send)]
pub trait Connection {
    async fn send_raw_transaction(
        &self,
        transaction: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, WalletError>;
}
