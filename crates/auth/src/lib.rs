//! Interactive login and workforce identity federation.
//!
//! [`callback`] captures the identity provider's redirect, [`exchange`] turns
//! the authorization code into a provider token and then into a federated
//! cloud credential, and the [`CredentialBroker`] drives the whole cycle
//! against a [`CredentialStore`](wifassist_types::CredentialStore).

pub mod broker;
pub mod callback;
pub mod entra;
pub mod exchange;
pub mod flow;

#[cfg(test)]
mod test_support;

pub use broker::{AuthRequired, BrokerState, CredentialBroker, CredentialCheck, LoginTicket};
pub use callback::{CallbackEvent, PendingRedirect, RedirectCapture};
pub use exchange::TokenExchangeClient;
pub use flow::{interactive_login, open_browser};
