/*!

# Wallet adapter

This library manages the connection between a web application and the
user's wallets: which wallet is selected, whether it is connected, which
account it exposes, and routing signing requests to it.

## Features

- Detect wallets injected by browser extensions, or registered through the
  wallet standard
- Select a wallet and remember the choice across visits
- Connect, disconnect and reconnect automatically
- Sign transactions and messages, send transactions

## Usage

Every wallet integration implements the [`Adapter`] trait. The
[`WalletManager`] keeps the list of adapters and drives the selected one:

```no_run
use std::rc::Rc;
use wallet_adapter::{
    BrowserHost, Capabilities, DetectorConfig, InjectedAdapter, LocalStorage, ManagerConfig,
    WalletManager, spawner,
};

# async fn test() -> anyhow::Result<()> {
let phantom = InjectedAdapter::new(
    "Phantom",
    "data:image/svg+xml;base64,...",
    "https://phantom.app",
    "phantom.solana",
    Capabilities::all(),
    &BrowserHost,
    DetectorConfig::default(),
);

let manager = WalletManager::new(
    [Rc::new(phantom) as Rc<dyn wallet_adapter::Adapter>],
    Rc::new(LocalStorage::new()),
    ManagerConfig { auto_connect: true, ..ManagerConfig::default() },
    spawner(),
);

manager.select_wallet(Some("Phantom")).await?;
manager.connect().await?;
println!("connected as {}", manager.public_key().unwrap());
# Ok(()) }
```

UIs follow the manager through its events, or render from a
[`WalletSnapshot`]:

```no_run
# use wallet_adapter::{ManagerEvent, WalletManager};
# fn test(manager: &WalletManager) {
manager.events().on(|event| match event {
    ManagerEvent::Connect(public_key) => println!("connected: {public_key}"),
    ManagerEvent::Error(error) => eprintln!("{error}"),
    _ => {}
});
# }
```

Wallets implementing the wallet standard register themselves with the page,
see [`standard`] and [`web::standard`].

*/

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod ffi;
pub mod key;
pub mod manager;
pub mod ready;
pub mod standard;
pub mod storage;
pub mod transaction;
pub mod web;

#[cfg(test)]
mod testing;

pub use self::{
    adapter::{Adapter, AdapterEvent, Capabilities, Capability, LazyAdapter, ReadyState},
    config::{DetectorConfig, ManagerConfig},
    error::{WalletError, WalletErrorKind},
    key::{PublicKey, Signature},
    manager::{
        ConnectionState, LifecycleState, ManagerEvent, WalletInfo, WalletManager, WalletSnapshot,
    },
    storage::{MemoryStorage, Storage},
    transaction::{Connection, SendOptions, Transaction, TransactionVersion},
    web::{BrowserHost, InjectedAdapter, LocalStorage, spawner},
};
