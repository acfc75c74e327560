//! # Event Pump
//!
//! The engine and each bridge publish on their own broadcast channels. This
//! module merges them into one [`NodeEvent`] stream for WebSocket clients
//! and counts them into the metrics on the way past.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use ridepay_protocol::bridge::{BridgeEvent, DeepLinkRouter};
use ridepay_protocol::payment::{PaymentEngine, SessionEvent};

use crate::metrics::SharedMetrics;

/// What `/ws` subscribers receive.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NodeEvent {
    Payment(SessionEvent),
    Wallet(BridgeEvent),
}

/// Start one forwarding task for the engine and one per bridge.
///
/// The tasks run until their source channel closes; abort the handles to
/// stop them sooner.
pub fn spawn_forwarders(
    engine: &PaymentEngine,
    router: &DeepLinkRouter,
    tx: broadcast::Sender<NodeEvent>,
    metrics: SharedMetrics,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(router.bridges().len() + 1);

    {
        let tx = tx.clone();
        let metrics = metrics.clone();
        let counter = engine.clone();
        handles.push(tokio::spawn(forward(engine.subscribe(), move |event| {
            metrics.record_session_event(&event);
            metrics.sessions_tracked.set(counter.session_count() as i64);
            let _ = tx.send(NodeEvent::Payment(event));
        })));
    }

    for bridge in router.bridges() {
        let tx = tx.clone();
        let metrics = metrics.clone();
        handles.push(tokio::spawn(forward(bridge.subscribe_events(), move |event| {
            metrics.record_bridge_event(&event);
            let _ = tx.send(NodeEvent::Wallet(event));
        })));
    }

    handles
}

async fn forward<E: Clone>(mut rx: broadcast::Receiver<E>, mut on_event: impl FnMut(E)) {
    loop {
        match rx.recv().await {
            Ok(event) => on_event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "event forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridepay_protocol::bridge::WalletProvider;

    #[test]
    fn events_carry_their_source() {
        let json = serde_json::to_value(NodeEvent::Payment(SessionEvent::Expired {
            transaction_id: "pay_1".into(),
        }))
        .unwrap();
        assert_eq!(json["source"], "payment");
        assert_eq!(json["type"], "expired");
        assert_eq!(json["transaction_id"], "pay_1");

        let json = serde_json::to_value(NodeEvent::Wallet(BridgeEvent::Disconnected {
            provider: WalletProvider::Backpack,
        }))
        .unwrap();
        assert_eq!(json["source"], "wallet");
        assert_eq!(json["provider"], "backpack");
    }
}
