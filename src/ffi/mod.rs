pub mod provider;
pub mod standard;

pub use self::{
    provider::InjectedProvider,
    standard::{JsStandardAccount, JsStandardWallet},
};
