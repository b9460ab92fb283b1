//! End-to-end tests over a shared in-process window.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use portal_bridge::{
    Bridge, BridgeConfig, ConnectionState, Host, InboundMessage, MethodRegistry, RawEvent,
    WindowChannel,
};
use portal_core::{BridgeError, JsonRpcError, JsonRpcRequest};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

const ORIGIN: &str = "https://app.example";
const TIMEOUT: Duration = Duration::from_secs(5);

/// Next request frame seen by a raw window subscriber.
async fn next_request(rx: &mut mpsc::UnboundedReceiver<InboundMessage>) -> Value {
    loop {
        let frame = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        if frame.data["type"] == "request" {
            return frame.data;
        }
    }
}

fn response_frame(id: &Value, result: Value) -> Value {
    json!({
        "type": "response",
        "target": "PortalPageScript",
        "response": {"jsonrpc": "2.0", "id": id, "result": result}
    })
}

fn wallet_host(window: &WindowChannel) -> Host {
    let mut registry = MethodRegistry::new();
    registry.register_fn("accounts", |_| async { Ok::<_, JsonRpcError>(json!(["0xabc"])) });
    registry.register_fn("isConnected", |_| async { Ok::<_, JsonRpcError>(json!(true)) });
    registry.register_fn("signMessage", |_| async {
        Err::<Value, _>(JsonRpcError::new(-32000, "User rejected the request"))
    });
    Host::listen(BridgeConfig::content_script(ORIGIN), window.endpoint(ORIGIN), registry)
}

#[tokio::test]
async fn accounts_round_trip() {
    let window = WindowChannel::new();
    let _host = wallet_host(&window);
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let accounts: Vec<String> = timeout(TIMEOUT, bridge.request("accounts", json!({})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accounts, ["0xabc"]);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn remote_error_reaches_caller() {
    let window = WindowChannel::new();
    let _host = wallet_host(&window);
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let err = timeout(TIMEOUT, bridge.request_value("signMessage", json!({})))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.remote().unwrap().message, "User rejected the request");
}

#[tokio::test]
async fn unknown_method_is_a_remote_error() {
    let window = WindowChannel::new();
    let _host = wallet_host(&window);
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let err = timeout(TIMEOUT, bridge.request_value("selectNetwork", json!({})))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.remote().unwrap().code, portal_core::jsonrpc::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn out_of_order_responses_match_by_id() {
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let network = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request_value("network", json!({})).await }
    });
    let connected = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request_value("isConnected", json!({})).await }
    });

    let a = next_request(&mut remote_rx).await;
    let b = next_request(&mut remote_rx).await;
    let (network_req, connected_req) = if a["request"]["method"] == "network" {
        (a, b)
    } else {
        (b, a)
    };
    assert_ne!(network_req["request"]["id"], connected_req["request"]["id"]);

    // isConnected answered first
    let _ = window.post(ORIGIN, response_frame(&connected_req["request"]["id"], json!(true)));
    let _ = window.post(
        ORIGIN,
        response_frame(
            &network_req["request"]["id"],
            json!({"url": "http://localhost:4000/graphql"}),
        ),
    );

    assert_eq!(connected.await.unwrap().unwrap(), json!(true));
    assert_eq!(
        network.await.unwrap().unwrap(),
        json!({"url": "http://localhost:4000/graphql"})
    );
}

#[tokio::test]
async fn untrusted_origin_cannot_resolve_or_emit() {
    let (logs, _guard) = portal_logging::capture_logs();
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));
    let fired = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fired);
    let _ = bridge.on("accounts".into(), move |_| *counter.lock() += 1);

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request_value("accounts", json!({})).await }
    });
    let request = next_request(&mut remote_rx).await;
    let id = &request["request"]["id"];

    let _ = window.post("https://evil.example", response_frame(id, json!(["0xevil"])));
    let _ = window.post(
        "https://evil.example",
        json!({
            "type": "event",
            "target": "PortalPageScript",
            "eventName": "accounts",
            "data": ["0xevil"]
        }),
    );
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!call.is_finished());
    assert_eq!(*fired.lock(), 0);
    assert!(logs.has_field("reason", "untrusted_origin"));

    let _ = window.post(ORIGIN, response_frame(id, json!(["0xabc"])));
    assert_eq!(call.await.unwrap().unwrap(), json!(["0xabc"]));
}

#[tokio::test]
async fn own_requests_echoed_on_the_window_are_ignored() {
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request_value("accounts", json!({})).await }
    });
    let request = next_request(&mut remote_rx).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    // the bridge saw its own request frame and dropped it
    assert_eq!(bridge.pending_count(), 1);

    let _ = window.post(ORIGIN, response_frame(&request["request"]["id"], json!([])));
    assert_eq!(call.await.unwrap().unwrap(), json!([]));
}

#[tokio::test]
async fn send_without_request_posts_nothing() {
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    assert_eq!(bridge.send(None).await.unwrap(), None);
    assert!(remote_rx.try_recv().is_err());
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn close_rejects_pending_and_later_calls_skip_transport() {
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));
    assert_eq!(window.subscriber_count(), 2);

    let pending = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.request_value("accounts", json!({})).await }
    });
    let _ = next_request(&mut remote_rx).await;

    bridge.close();
    assert_matches!(pending.await.unwrap(), Err(BridgeError::ConnectionClosed));

    assert_matches!(
        bridge.request_value("accounts", json!({})).await,
        Err(BridgeError::ConnectionClosed)
    );
    assert_matches!(
        bridge.send(Some(JsonRpcRequest::notification("accounts", json!({})))).await,
        Err(BridgeError::ConnectionClosed)
    );
    while let Ok(frame) = remote_rx.try_recv() {
        assert_ne!(frame.data["type"], "request", "closed bridge posted {frame:?}");
    }

    // hook detached once the aborted task is dropped
    for _ in 0..10 {
        if window.subscriber_count() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(window.subscriber_count(), 1);
    assert_eq!(bridge.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn close_rejects_in_registration_order() {
    let window = WindowChannel::new();
    let mut remote_rx = window.subscribe();
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));
    let (order_tx, mut order_rx) = mpsc::unbounded_channel();

    for method in ["first", "second", "third"] {
        let bridge = bridge.clone();
        let order_tx = order_tx.clone();
        let _ = tokio::spawn(async move {
            let result = bridge.request_value(method, json!({})).await;
            assert_matches!(result, Err(BridgeError::ConnectionClosed));
            let _ = order_tx.send(method);
        });
        let _ = next_request(&mut remote_rx).await;
    }
    drop(order_tx);

    bridge.close();
    let mut order = Vec::new();
    while let Some(method) = order_rx.recv().await {
        order.push(method);
    }
    assert_eq!(order, ["first", "second", "third"]);
}

#[tokio::test]
async fn events_fan_out_in_order_despite_panics() {
    let window = WindowChannel::new();
    let host = wallet_host(&window);
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let first = Arc::clone(&seen);
    let last = Arc::clone(&seen);
    let _ = bridge
        .on("accounts".into(), move |ev: &RawEvent| first.lock().push(format!("first:{}", ev.data)))
        .on("accounts".into(), |_| panic!("listener bug"))
        .on("accounts".into(), move |ev: &RawEvent| {
            last.lock().push(format!("last:{}", ev.data));
            let _ = done_tx.send(());
        });

    host.emit("accounts", json!(["0xabc"])).unwrap();
    timeout(TIMEOUT, done_rx.recv()).await.unwrap().unwrap();

    assert_eq!(*seen.lock(), [r#"first:["0xabc"]"#, r#"last:["0xabc"]"#]);
    assert_eq!(bridge.state(), ConnectionState::Listening);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_remote_times_out() {
    let window = WindowChannel::new();
    let config = BridgeConfig::page(ORIGIN).with_request_timeout(Duration::from_secs(30));
    let bridge = Bridge::<RawEvent>::listen(config, window.endpoint(ORIGIN));

    let err = bridge.request_value("network", json!({})).await.unwrap_err();
    assert_matches!(err, BridgeError::Timeout { timeout_ms: 30_000, .. });
    assert_eq!(err.code(), portal_core::errors::TIMEOUT);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn concurrent_calls_through_host() {
    let window = WindowChannel::new();
    let _host = wallet_host(&window);
    let bridge = Bridge::<RawEvent>::listen(BridgeConfig::page(ORIGIN), window.endpoint(ORIGIN));

    let (accounts, connected) = timeout(
        TIMEOUT,
        futures::future::join(
            bridge.request::<Vec<String>>("accounts", json!({})),
            bridge.request::<bool>("isConnected", json!({})),
        ),
    )
    .await
    .unwrap();
    assert_eq!(accounts.unwrap(), ["0xabc"]);
    assert!(connected.unwrap());
}
