//! Page-side wallet connection.

use parking_lot::RwLock;
use portal_bridge::{Bridge, BridgeConfig, Transport};
use portal_core::{BridgeError, ContextId, ListenerId, Result};
use portal_settings::PortalSettings;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::events::{ProviderConfig, WalletEvent, WalletEventName};

/// JSON-RPC method names understood by the extension.
pub mod methods {
    /// Current network.
    pub const NETWORK: &str = "network";
    /// Whether the page is connected.
    pub const IS_CONNECTED: &str = "isConnected";
    /// Ask the user to connect.
    pub const CONNECT: &str = "connect";
    /// Drop the page's connection.
    pub const DISCONNECT: &str = "disconnect";
    /// Accounts shared with the page.
    pub const ACCOUNTS: &str = "accounts";
    /// Sign an arbitrary message.
    pub const SIGN_MESSAGE: &str = "signMessage";
    /// Sign and submit a transaction.
    pub const SEND_TRANSACTION: &str = "sendTransaction";
    /// Account selected in the wallet.
    pub const GET_SELECTED_ACCOUNT: &str = "getSelectedAccount";
}

/// Wallet API for the page, delegating to a [`Bridge`].
#[derive(Debug)]
pub struct WalletConnection {
    bridge: Bridge<WalletEvent>,
    provider: RwLock<ProviderConfig>,
}

impl WalletConnection {
    /// Connect over `transport` with the default provider. Must run inside a
    /// Tokio runtime.
    pub fn new(config: BridgeConfig, transport: impl Transport) -> Self {
        Self::with_bridge(Bridge::listen(config, transport), ProviderConfig::default())
    }

    /// Connect using loaded settings for the trusted origin, timeout and
    /// provider URL.
    pub fn from_settings(settings: &PortalSettings, transport: impl Transport) -> Self {
        let config = BridgeConfig::from_settings(ContextId::PageScript, &settings.bridge);
        Self::with_bridge(
            Bridge::listen(config, transport),
            ProviderConfig::new(settings.provider.url.clone()),
        )
    }

    /// Wrap an existing bridge.
    pub fn with_bridge(bridge: Bridge<WalletEvent>, provider: ProviderConfig) -> Self {
        Self {
            bridge,
            provider: RwLock::new(provider),
        }
    }

    /// The underlying bridge.
    pub fn bridge(&self) -> &Bridge<WalletEvent> {
        &self.bridge
    }

    /// Provider sent along with transactions.
    pub fn provider(&self) -> ProviderConfig {
        self.provider.read().clone()
    }

    /// Change the provider locally. Nothing is sent.
    pub fn select_network(&self, provider: ProviderConfig) {
        debug!(url = %provider.url, "selected network");
        *self.provider.write() = provider;
    }

    /// Network the wallet is on.
    pub async fn network(&self) -> Result<ProviderConfig> {
        self.bridge.request(methods::NETWORK, json!({})).await
    }

    /// Whether the page is connected.
    pub async fn is_connected(&self) -> Result<bool> {
        self.bridge.request(methods::IS_CONNECTED, json!({})).await
    }

    /// Request a connection, optionally selecting `network` first.
    #[instrument(skip(self, network), fields(method = methods::CONNECT))]
    pub async fn connect(&self, network: Option<ProviderConfig>) -> Result<bool> {
        if let Some(network) = network {
            self.select_network(network);
        }
        self.bridge.request(methods::CONNECT, json!({})).await
    }

    /// Drop the page's connection. The bridge itself stays open.
    #[instrument(skip(self), fields(method = methods::DISCONNECT))]
    pub async fn disconnect(&self) -> Result<bool> {
        self.bridge.request(methods::DISCONNECT, json!({})).await
    }

    /// Accounts shared with the page.
    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.bridge.request(methods::ACCOUNTS, json!({})).await
    }

    /// Sign `message` with `address`. Blank messages are rejected locally.
    #[instrument(skip(self, message), fields(method = methods::SIGN_MESSAGE))]
    pub async fn sign_message(&self, address: &str, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(BridgeError::validation("Message is required"));
        }
        self.bridge
            .request(methods::SIGN_MESSAGE, json!({ "address": address, "message": message }))
            .await
    }

    /// Sign and submit `transaction` against the selected provider.
    ///
    /// `None`, or a value serializing to `null`, is rejected locally. The
    /// transaction travels as a JSON string.
    #[instrument(skip(self, transaction), fields(method = methods::SEND_TRANSACTION))]
    pub async fn send_transaction<T: Serialize + ?Sized>(
        &self,
        transaction: Option<&T>,
    ) -> Result<String> {
        let transaction = match transaction.map(serde_json::to_value).transpose() {
            Ok(Some(value)) if !value.is_null() => value,
            Ok(_) => return Err(BridgeError::validation("Transaction is required")),
            Err(err) => return Err(BridgeError::Encode(err)),
        };
        let encoded = serde_json::to_string(&transaction).map_err(BridgeError::Encode)?;
        let params = json!({ "provider": self.provider(), "transaction": encoded });
        self.bridge.request(methods::SEND_TRANSACTION, params).await
    }

    /// Account selected in the wallet.
    pub async fn get_selected_account(&self) -> Result<String> {
        self.bridge.request(methods::GET_SELECTED_ACCOUNT, json!({})).await
    }

    /// Register a listener. Chainable.
    pub fn on(
        &self,
        name: WalletEventName,
        listener: impl Fn(&WalletEvent) + Send + Sync + 'static,
    ) -> &Self {
        let _ = self.bridge.on(name, listener);
        self
    }

    /// Register a listener and return its handle.
    pub fn subscribe(
        &self,
        name: WalletEventName,
        listener: impl Fn(&WalletEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.bridge.subscribe(name, listener)
    }

    /// Remove a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.bridge.off(id)
    }

    /// Raw call for methods this type does not wrap.
    pub async fn request_value(&self, method: &str, params: Value) -> Result<Value> {
        self.bridge.request_value(method, params).await
    }

    /// Tear down the bridge. Pending calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.bridge.close();
    }
}
