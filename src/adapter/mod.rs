use crate::{
    error::{WalletError, WalletErrorKind},
    event::EventEmitter,
    key::{PublicKey, Signature},
    transaction::{
        Connection, SendOptions, SupportedTransactionVersions, Transaction, TransactionVersion,
    },
};
use async_trait::async_trait;
use std::fmt;

mod lazy;
mod state;

pub use self::{
    lazy::{AdapterLoader, LazyAdapter},
    state::{AdapterState, ConnectGuard},
};

/// Whether the provider behind an adapter can be reached from this page.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ReadyState {
    /// the environment can never support this wallet (e.g. no browser)
    Unsupported,
    /// the wallet has not been found in the page (yet)
    NotDetected,
    /// the wallet's SDK will be loaded on connect
    Loadable,
    /// the wallet is present in the page
    Installed,
}

impl ReadyState {
    /// `connect` may be attempted
    pub fn is_ready(self) -> bool {
        matches!(self, ReadyState::Installed | ReadyState::Loadable)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadyState::Unsupported => write!(f, "unsupported"),
            ReadyState::NotDetected => write!(f, "not detected"),
            ReadyState::Loadable => write!(f, "loadable"),
            ReadyState::Installed => write!(f, "installed"),
        }
    }
}

/// Events published by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Connect(PublicKey),
    Disconnect,
    Error(WalletError),
    ReadyStateChange(ReadyState),
}

/// The optional operations of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SignTransaction,
    SignAllTransactions,
    SignMessage,
    SendTransaction,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SignTransaction => write!(f, "signTransaction"),
            Capability::SignAllTransactions => write!(f, "signAllTransactions"),
            Capability::SignMessage => write!(f, "signMessage"),
            Capability::SendTransaction => write!(f, "sendTransaction"),
        }
    }
}

/// What an adapter declares it can do on top of connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub sign_transaction: bool,
    pub sign_all_transactions: bool,
    pub sign_message: bool,
    pub send_transaction: bool,
    pub supported_transaction_versions: SupportedTransactionVersions,
}

impl Capabilities {
    /// every capability, legacy transactions only
    pub fn all() -> Self {
        Self {
            sign_transaction: true,
            sign_all_transactions: true,
            sign_message: true,
            send_transaction: true,
            supported_transaction_versions: None,
        }
    }

    pub fn with_versions(
        mut self,
        versions: impl IntoIterator<Item = TransactionVersion>,
    ) -> Self {
        self.supported_transaction_versions = Some(versions.into_iter().collect());
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::SignTransaction => self.sign_transaction,
            Capability::SignAllTransactions => self.sign_all_transactions,
            Capability::SignMessage => self.sign_message,
            Capability::SendTransaction => self.send_transaction,
        }
    }

    pub fn supports_version(&self, version: TransactionVersion) -> bool {
        match &self.supported_transaction_versions {
            None => version == TransactionVersion::Legacy,
            Some(versions) => versions.contains(&version),
        }
    }
}

/// Invoking a capability an adapter did not declare is a bug in the caller.
///
/// # Panics
///
/// Always.
#[track_caller]
pub fn unsupported(adapter: &str, capability: Capability) -> ! {
    panic!("wallet adapter `{adapter}' does not support {capability}")
}

/// The contract every wallet integration implements.
///
/// Adapters own an [`EventEmitter`] (usually through an [`AdapterState`])
/// and publish [`AdapterEvent`]s on it. The optional operations default to
/// panicking: callers check [`Adapter::capabilities`] first.
#[async_trait(?Send)]
pub trait Adapter {
    /// unique name of the wallet, e.g. `"Phantom"`
    fn name(&self) -> &str;

    /// HTML ready icon (usually a data URI)
    fn icon(&self) -> &str;

    /// where to get the wallet from
    fn url(&self) -> &str;

    fn ready_state(&self) -> ReadyState;

    fn public_key(&self) -> Option<PublicKey>;

    fn connecting(&self) -> bool;

    fn connected(&self) -> bool {
        self.public_key().is_some()
    }

    fn capabilities(&self) -> Capabilities;

    fn events(&self) -> &EventEmitter<AdapterEvent>;

    /// Connect to the wallet, prompting the user if needed.
    ///
    /// Does nothing if already connected or connecting. On failure the
    /// adapter is left disconnected and the error has been published as an
    /// [`AdapterEvent::Error`] before being returned.
    async fn connect(&self) -> Result<(), WalletError>;

    /// Connect without user interaction where the wallet allows it.
    async fn auto_connect(&self) -> Result<(), WalletError> {
        self.connect().await
    }

    /// Idempotent and infallible, failures are only published as
    /// [`AdapterEvent::Error`].
    async fn disconnect(&self);

    async fn sign_transaction(&self, _transaction: Transaction) -> Result<Transaction, WalletError> {
        unsupported(self.name(), Capability::SignTransaction)
    }

    async fn sign_all_transactions(
        &self,
        _transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        unsupported(self.name(), Capability::SignAllTransactions)
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<Signature, WalletError> {
        unsupported(self.name(), Capability::SignMessage)
    }

    async fn send_transaction(
        &self,
        _transaction: Transaction,
        _connection: &dyn Connection,
        _options: &SendOptions,
    ) -> Result<Signature, WalletError> {
        unsupported(self.name(), Capability::SendTransaction)
    }
}

/// `send_transaction` for adapters that can only sign: sign with the wallet
/// then submit through `connection`.
///
/// Errors not coming from the adapter itself are published on its event
/// channel, the adapter already publishes its own signing errors.
pub async fn sign_and_send<A>(
    adapter: &A,
    transaction: Transaction,
    connection: &dyn Connection,
    options: &SendOptions,
) -> Result<Signature, WalletError>
where
    A: Adapter + ?Sized,
{
    let report = |error: WalletError| {
        adapter.events().emit(&AdapterEvent::Error(error.clone()));
        error
    };

    if !adapter
        .capabilities()
        .supports_version(transaction.version())
    {
        return Err(report(WalletError::new(
            WalletErrorKind::SendTransaction,
            format!(
                "Sending {:?} transactions isn't supported by this wallet",
                transaction.version()
            ),
        )));
    }

    let signed = adapter.sign_transaction(transaction).await?;

    connection
        .send_raw_transaction(signed.as_bytes(), options)
        .await
        .map_err(|error| report(error.with_kind(WalletErrorKind::SendTransaction)))
}
