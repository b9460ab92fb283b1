//! Wallet events pushed from the extension.

use std::fmt;

use portal_bridge::{BridgeEvent, EventDecodeError};
use portal_settings::DEFAULT_PROVIDER_URL;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The network endpoint transactions are sent against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider URL.
    pub url: String,
}

impl ProviderConfig {
    /// Provider at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_URL)
    }
}

/// Event names, used as listener keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WalletEventName {
    /// `accounts`
    Accounts,
    /// `currentAccount`
    CurrentAccount,
    /// `connection`
    Connection,
    /// `network`
    Network,
}

impl WalletEventName {
    /// Every name, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Accounts,
        Self::CurrentAccount,
        Self::Connection,
        Self::Network,
    ];

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::CurrentAccount => "currentAccount",
            Self::Connection => "connection",
            Self::Network => "network",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == name)
    }
}

impl fmt::Display for WalletEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event with its typed payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventName", content = "data", rename_all = "camelCase")]
pub enum WalletEvent {
    /// Accounts the page may use.
    Accounts(Vec<String>),
    /// The account selected in the wallet.
    CurrentAccount(String),
    /// Whether the page is connected.
    Connection(bool),
    /// The wallet switched networks.
    Network(ProviderConfig),
}

impl WalletEvent {
    /// Payload as it travels in the `data` field.
    pub fn data(&self) -> Value {
        match self {
            Self::Accounts(accounts) => json!(accounts),
            Self::CurrentAccount(account) => json!(account),
            Self::Connection(connected) => json!(connected),
            Self::Network(provider) => json!(provider),
        }
    }
}

impl BridgeEvent for WalletEvent {
    type Name = WalletEventName;

    fn name(&self) -> WalletEventName {
        match self {
            Self::Accounts(_) => WalletEventName::Accounts,
            Self::CurrentAccount(_) => WalletEventName::CurrentAccount,
            Self::Connection(_) => WalletEventName::Connection,
            Self::Network(_) => WalletEventName::Network,
        }
    }

    fn decode(event_name: &str, data: Value) -> Result<Self, EventDecodeError> {
        if WalletEventName::parse(event_name).is_none() {
            return Err(EventDecodeError::UnknownName(event_name.to_owned()));
        }
        serde_json::from_value(json!({ "eventName": event_name, "data": data })).map_err(|source| {
            EventDecodeError::InvalidPayload {
                name: event_name.to_owned(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_each_event() {
        assert_eq!(
            WalletEvent::decode("accounts", json!(["0xabc", "0xdef"])).unwrap(),
            WalletEvent::Accounts(vec!["0xabc".into(), "0xdef".into()])
        );
        assert_eq!(
            WalletEvent::decode("currentAccount", json!("0xabc")).unwrap(),
            WalletEvent::CurrentAccount("0xabc".into())
        );
        assert_eq!(
            WalletEvent::decode("connection", json!(false)).unwrap(),
            WalletEvent::Connection(false)
        );
        assert_eq!(
            WalletEvent::decode("network", json!({"url": "https://beta.example/graphql"})).unwrap(),
            WalletEvent::Network(ProviderConfig::new("https://beta.example/graphql"))
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_matches!(
            WalletEvent::decode("balance", json!(1)),
            Err(EventDecodeError::UnknownName(name)) if name == "balance"
        );
    }

    #[test]
    fn wrong_payload_is_rejected() {
        assert_matches!(
            WalletEvent::decode("connection", json!("yes")),
            Err(EventDecodeError::InvalidPayload { name, .. }) if name == "connection"
        );
        assert!(WalletEvent::decode("accounts", json!(null)).is_err());
    }

    #[test]
    fn name_matches_wire_name() {
        for name in WalletEventName::ALL {
            assert_eq!(WalletEventName::parse(name.as_str()), Some(name));
        }
        assert_eq!(WalletEvent::Connection(true).name(), WalletEventName::Connection);
        assert_eq!(WalletEventName::CurrentAccount.to_string(), "currentAccount");
    }

    #[test]
    fn serialized_shape_matches_frame_fields() {
        let ev = WalletEvent::CurrentAccount("0xabc".into());
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"eventName": "currentAccount", "data": "0xabc"})
        );
        assert_eq!(ev.data(), json!("0xabc"));
    }

    #[test]
    fn provider_default_is_local_node() {
        assert_eq!(ProviderConfig::default().url, "http://localhost:4000/graphql");
    }
}
