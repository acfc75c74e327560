//! # Prometheus Metrics
//!
//! Operational counters for the node, scraped at `/metrics` on the metrics
//! port. Everything lives in a dedicated [`prometheus::Registry`] under the
//! `ridepay` namespace.
//!
//! Counters are fed from the engine and bridge event streams (see
//! `events.rs`), so a session that completes because the poller noticed it
//! counts the same as one completed by an explicit verify.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use ridepay_protocol::bridge::BridgeEvent;
use ridepay_protocol::payment::SessionEvent;

/// Every metric handle the node records into.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub sessions_created_total: IntCounter,
    pub sessions_completed_total: IntCounter,
    pub sessions_expired_total: IntCounter,
    pub sessions_cancelled_total: IntCounter,
    /// Verification attempts that found nothing (yet).
    pub verification_polls_total: IntCounter,
    /// Quotes made at the fallback rate because the price feed was down.
    pub degraded_conversions_total: IntCounter,
    /// Sessions currently held by the engine, any status.
    pub sessions_tracked: IntGauge,
    /// Inbound wallet callbacks, by provider and outcome.
    pub bridge_callbacks_total: IntCounterVec,
    /// Bridge lifecycle events, by provider and kind.
    pub bridge_events_total: IntCounterVec,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<IntCounterVec> {
    let c = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Create and register everything. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("ridepay".into()), None)?;

        let sessions_tracked = IntGauge::new(
            "sessions_tracked",
            "Payment sessions currently held by the engine",
        )?;
        registry.register(Box::new(sessions_tracked.clone()))?;

        Ok(Self {
            sessions_created_total: counter(
                &registry,
                "sessions_created_total",
                "Payment sessions opened",
            )?,
            sessions_completed_total: counter(
                &registry,
                "sessions_completed_total",
                "Payment sessions matched to a ledger transfer",
            )?,
            sessions_expired_total: counter(
                &registry,
                "sessions_expired_total",
                "Payment sessions whose window closed unpaid",
            )?,
            sessions_cancelled_total: counter(
                &registry,
                "sessions_cancelled_total",
                "Payment sessions cancelled by the caller",
            )?,
            verification_polls_total: counter(
                &registry,
                "verification_polls_total",
                "Verification attempts that found no matching transfer",
            )?,
            degraded_conversions_total: counter(
                &registry,
                "degraded_conversions_total",
                "Fare quotes made at the fallback exchange rate",
            )?,
            bridge_callbacks_total: counter_vec(
                &registry,
                "bridge_callbacks_total",
                "Inbound wallet callbacks",
                &["provider", "outcome"],
            )?,
            bridge_events_total: counter_vec(
                &registry,
                "bridge_events_total",
                "Wallet bridge lifecycle events",
                &["provider", "event"],
            )?,
            sessions_tracked,
            registry,
        })
    }

    pub fn record_session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Created { degraded_rate, .. } => {
                self.sessions_created_total.inc();
                if *degraded_rate {
                    self.degraded_conversions_total.inc();
                }
            }
            SessionEvent::Completed { .. } => self.sessions_completed_total.inc(),
            SessionEvent::Expired { .. } => self.sessions_expired_total.inc(),
            SessionEvent::Cancelled { .. } => self.sessions_cancelled_total.inc(),
            SessionEvent::Polled { .. } => self.verification_polls_total.inc(),
        }
    }

    pub fn record_bridge_event(&self, event: &BridgeEvent) {
        let (provider, name) = match event {
            BridgeEvent::Connected { provider, .. } => (provider, "connected"),
            BridgeEvent::ConnectFailed { provider, .. } => (provider, "connect_failed"),
            BridgeEvent::TransactionSent { provider, .. } => (provider, "transaction_sent"),
            BridgeEvent::TransactionConfirmed { provider, .. } => (provider, "transaction_confirmed"),
            BridgeEvent::TransactionUnconfirmed { provider, .. } => {
                (provider, "transaction_unconfirmed")
            }
            BridgeEvent::TransactionFailed { provider, .. } => (provider, "transaction_failed"),
            BridgeEvent::SignRejected { provider, .. } => (provider, "sign_rejected"),
            BridgeEvent::Disconnected { provider } => (provider, "disconnected"),
        };
        self.bridge_events_total
            .with_label_values(&[provider.slug(), name])
            .inc();
    }

    /// Render everything in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridepay_protocol::amount::Lamports;
    use ridepay_protocol::bridge::WalletProvider;

    #[test]
    fn session_events_feed_the_counters() {
        let m = NodeMetrics::new().unwrap();
        m.record_session_event(&SessionEvent::Created {
            transaction_id: "pay_1".into(),
            ledger_amount: Lamports(50_000_000),
            degraded_rate: true,
        });
        m.record_session_event(&SessionEvent::Expired {
            transaction_id: "pay_1".into(),
        });

        assert_eq!(m.sessions_created_total.get(), 1);
        assert_eq!(m.degraded_conversions_total.get(), 1);
        assert_eq!(m.sessions_expired_total.get(), 1);
        assert_eq!(m.sessions_completed_total.get(), 0);
    }

    #[test]
    fn encoded_output_is_namespaced() {
        let m = NodeMetrics::new().unwrap();
        m.record_bridge_event(&BridgeEvent::Disconnected {
            provider: WalletProvider::Phantom,
        });
        let text = m.encode().unwrap();
        assert!(text.contains("ridepay_sessions_created_total"));
        let line = text
            .lines()
            .find(|l| l.starts_with("ridepay_bridge_events_total{"))
            .unwrap();
        assert!(line.contains("event=\"disconnected\""));
        assert!(line.contains("provider=\"phantom\""));
        assert!(line.ends_with(" 1"));
    }
}
