//! Bus driver.
//!
//! Connects the configured bus, feeds its events through the
//! [`RelayEngine`] one at a time and executes the resulting commands.

use crate::config::BusConfig;
use crate::metrics;
use concierge_core::{BusCommand, Disposition, Outcome, RelayEngine};
use concierge_transport::{
    Bus, EventReceiver, EventSender, MemoryBus, NatsBus, NatsConfig, TransportError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Url scheme selecting the in-process loopback bus.
pub const MEMORY_SCHEME: &str = "memory://";

/// Connect the bus named by `config.url`, forwarding its events to `events`.
///
/// # Errors
///
/// Returns an error for an unsupported url scheme or a failed connection.
pub async fn connect_bus(
    config: &BusConfig,
    events: EventSender,
) -> Result<Arc<dyn Bus>, TransportError> {
    if config.url.starts_with(MEMORY_SCHEME) {
        let bus = MemoryBus::new(events);
        bus.connect().await?;
        info!("Using in-process memory bus");
        return Ok(Arc::new(bus));
    }

    if config.url.starts_with("nats://") || config.url.starts_with("tls://") {
        let nats_config = NatsConfig {
            url: config.url.clone(),
            client_name: config.client_id.clone(),
        };
        let bus = NatsBus::connect(&nats_config, events).await?;
        return Ok(Arc::new(bus));
    }

    Err(TransportError::UnsupportedUrl(config.url.clone()))
}

/// Drive `engine` with the events arriving on `events`.
///
/// Events are handled strictly in arrival order. When `shutdown` resolves
/// the channel is closed, already-queued events are drained and the loop
/// returns.
pub async fn run_relay(
    engine: Arc<RelayEngine>,
    mut events: EventReceiver,
    bus: Arc<dyn Bus>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut closing = false;

    info!(bus = bus.name(), connected = bus.is_connected(), "Relay loop started");

    loop {
        let event = tokio::select! {
            () = &mut shutdown, if !closing => {
                debug!("Relay shutdown requested, draining events");
                events.close();
                closing = true;
                continue;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            break;
        };

        let start = Instant::now();
        let kind = event.kind();
        let outcome = engine.handle(event);
        debug!(event = kind, disposition = outcome.disposition.label(), "Event handled");

        metrics::record_outcome(&outcome);
        if let Some((tracked, recent)) = client_counts(&engine, &outcome) {
            metrics::set_clients(tracked, recent);
        }

        execute(bus.as_ref(), outcome.commands).await;
        metrics::record_latency(start.elapsed().as_secs_f64());
    }

    info!("Relay loop stopped");
}

/// Tracked and recent client counts, when `outcome` may have moved them.
///
/// Connects and nudges refresh the counts too, since clients age out of
/// the recency window without any presence write.
fn client_counts(engine: &RelayEngine, outcome: &Outcome) -> Option<(usize, usize)> {
    let refresh = outcome.presence_changed
        || matches!(
            outcome.disposition,
            Disposition::Connected | Disposition::Nudged
        );
    refresh.then(|| (engine.tracked_count(), engine.recent_count()))
}

/// Close the bus, then stop the relay loop once it has drained.
pub async fn shutdown_relay(bus: &dyn Bus, stop: oneshot::Sender<()>, relay: JoinHandle<()>) {
    info!("Shutting down relay");
    if let Err(e) = bus.close().await {
        warn!("Bus close failed: {}", e);
    }
    let _ = stop.send(());
    if let Err(e) = relay.await {
        error!("Relay task failed: {}", e);
    }
}

/// Execute engine commands in order. Failures are logged and skipped.
async fn execute(bus: &dyn Bus, commands: Vec<BusCommand>) {
    for command in commands {
        match command {
            BusCommand::Subscribe(filter) => {
                if let Err(e) = bus.subscribe(&filter).await {
                    error!(filter = %filter, "Subscribe failed: {}", e);
                    metrics::record_error("subscribe");
                }
            }
            BusCommand::Publish { topic, payload } => match bus.publish(&topic, payload).await {
                Ok(()) => metrics::record_publish(),
                Err(e) => {
                    warn!(topic = %topic, "Publish failed: {}", e);
                    metrics::record_error("publish");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use concierge_core::{ManualClock, RelayConfig};
    use concierge_protocol::StatusName;
    use concierge_transport::{event_channel, BusEvent, Published};
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    const NOW: u64 = 1_700_000_000_000;

    fn engine() -> Arc<RelayEngine> {
        Arc::new(RelayEngine::with_clock(
            RelayConfig::default(),
            Arc::new(ManualClock::new(NOW, -3_600_000)),
        ))
    }

    async fn next_on(watch: &mut broadcast::Receiver<Published>, topic: &str) -> Published {
        timeout(Duration::from_secs(1), async {
            loop {
                let published = watch.recv().await.unwrap();
                if published.topic == topic {
                    return published;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_bus_rejects_unknown_scheme() {
        let (tx, _rx) = event_channel(8);
        let config = BusConfig {
            url: "mqtt://localhost:1883".to_string(),
            ..BusConfig::default()
        };
        assert!(matches!(
            connect_bus(&config, tx).await,
            Err(TransportError::UnsupportedUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_over_memory_bus() {
        let (tx, rx) = event_channel(64);
        let bus = Arc::new(MemoryBus::new(tx));
        let mut watch = bus.watch();
        let engine = engine();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let relay = tokio::spawn(run_relay(
            engine.clone(),
            rx,
            bus.clone(),
            async move {
                let _ = stop_rx.await;
            },
        ));

        bus.connect().await.unwrap();

        let status = next_on(&mut watch, "gigascapes/concierge/status").await;
        let status: Value = serde_json::from_slice(&status.payload).unwrap();
        assert_eq!(status["name"], "connected");
        assert_eq!(status["timestamp"], NOW);

        // Subscriptions are in place once the status went out.
        assert!(bus.filters().iter().any(|f| f == "gigascapes/+/positions"));

        bus.publish(
            "gigascapes/p1/positions",
            Bytes::from_static(br#"{"x":1,"y":2}"#),
        )
        .await
        .unwrap();

        let stamped = next_on(&mut watch, "gigascapes/p1/positions-ts").await;
        let stamped: Value = serde_json::from_slice(&stamped.payload).unwrap();
        assert_eq!(stamped["x"], 1);
        assert_eq!(stamped["serverUTCTime"], NOW);
        assert_eq!(stamped["serverUTCOffset"], -3_600_000);

        bus.publish("concierge/nudge", Bytes::new()).await.unwrap();
        let recent = next_on(&mut watch, "gigascapes/concierge/recent").await;
        let recent: Value = serde_json::from_slice(&recent.payload).unwrap();
        assert_eq!(recent[0]["id"], "p1");

        // Closing the bus emits End before the loop stops.
        bus.close().await.unwrap();
        stop_tx.send(()).unwrap();
        timeout(Duration::from_secs(1), relay).await.unwrap().unwrap();

        assert_eq!(engine.status_snapshot().name, StatusName::End);
    }

    #[tokio::test]
    async fn test_connect_bus_survives_unreachable_broker() {
        let (tx, _rx) = event_channel(8);
        let config = BusConfig {
            url: "nats://127.0.0.1:1".to_string(),
            ..BusConfig::default()
        };

        let bus = connect_bus(&config, tx).await.unwrap();
        assert_eq!(bus.name(), "nats");
        assert!(!bus.is_connected());
    }

    #[test]
    fn test_client_counts_follow_data_only_clients() {
        let engine = engine();

        let outcome = engine.handle(BusEvent::message("gigascapes/p1/positions", &b"{}"[..]));
        assert_eq!(client_counts(&engine, &outcome), Some((1, 1)));

        let outcome = engine.handle(BusEvent::message("$SYS/broker/uptime", &b"1"[..]));
        assert_eq!(client_counts(&engine, &outcome), None);

        let outcome = engine.handle(BusEvent::message("concierge/nudge", &b""[..]));
        assert_eq!(client_counts(&engine, &outcome), Some((1, 1)));
    }

    #[tokio::test]
    async fn test_shutdown_relay_closes_bus_and_joins_loop() {
        let (tx, rx) = event_channel(8);
        let bus = Arc::new(MemoryBus::new(tx));
        let engine = engine();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let relay = tokio::spawn(run_relay(engine.clone(), rx, bus.clone(), async move {
            let _ = stop_rx.await;
        }));
        bus.connect().await.unwrap();

        timeout(Duration::from_secs(1), shutdown_relay(bus.as_ref(), stop_tx, relay))
            .await
            .unwrap();

        assert_eq!(engine.status_snapshot().name, StatusName::End);
        assert!(!bus.is_connected());
    }

    #[tokio::test]
    async fn test_relay_stops_on_shutdown_while_bus_alive() {
        let (tx, rx) = event_channel(8);
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new(tx));

        let relay = tokio::spawn(run_relay(engine(), rx, bus, std::future::ready(())));

        timeout(Duration::from_secs(1), relay).await.unwrap().unwrap();
    }
}
