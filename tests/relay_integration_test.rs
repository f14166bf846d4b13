mod common;

use common::{MockBus, MockSink, publish, ready, wait_until};
use nats_to_syslog::bus::BusError;
use nats_to_syslog::formatter::EntryFormat;
use nats_to_syslog::relay::RelayState;
use nats_to_syslog::sink::{SinkError, SyslogConfig, SyslogSink};
use nats_to_syslog::{BusMessage, Relay, RelayError, RelaySettings, ShutdownReason, ShutdownSignal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::Span;

fn settings(capacity: usize) -> RelaySettings {
    RelaySettings {
        buffer_capacity: capacity,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_messages_arrive_in_publish_order() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, publisher, bus_recorder) = MockBus::new();

    let relay = Relay::start(
        settings(1000),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();
    assert_eq!(relay.state().get(), RelayState::Running);
    assert_eq!(bus_recorder.patterns(), vec![">".to_string()]);

    publish(&publisher, "a", "x");
    publish(&publisher, "b", "y");
    wait_until(|| sink_recorder.sent_count() == 2).await;

    relay
        .shutdown_signal()
        .fire(ShutdownReason::Signal("SIGTERM"));
    let outcome = relay.run().await;

    assert_eq!(sink_recorder.sent_data(), vec!["x", "y"]);
    let first: serde_json::Value = serde_json::from_slice(&sink_recorder.sent()[0]).unwrap();
    assert_eq!(first["Subject"], "a");
    assert_eq!(first["Reply"], "");

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.forwarder.forwarded, 2);
    assert!(outcome.sink.is_none());
    assert_eq!(sink_recorder.closes(), 1);
    assert_eq!(bus_recorder.closes(), 1);
}

#[tokio::test]
async fn test_fifo_for_burst_within_capacity() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, publisher, _) = MockBus::new();

    let relay = Relay::start(
        settings(64),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();

    let expected: Vec<String> = (0..64).map(|i| format!("event-{i}")).collect();
    for payload in &expected {
        publish(&publisher, "events", payload);
    }
    wait_until(|| sink_recorder.sent_count() == expected.len()).await;

    relay.shutdown_signal().fire(ShutdownReason::Signal("SIGINT"));
    relay.run().await;

    assert_eq!(sink_recorder.sent_data(), expected);
}

#[tokio::test]
async fn test_slow_sink_applies_backpressure_without_loss() {
    let gate = Arc::new(Semaphore::new(0));
    let (sink, sink_recorder) = MockSink::new();
    let sink = sink.gated(gate.clone());
    let (bus, publisher, _) = MockBus::new();

    let relay = Relay::start(
        settings(2),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();

    for i in 0..20 {
        publish(&publisher, "slow", &i.to_string());
    }

    // One send is stuck on the gate; the rest wait in or behind the buffer.
    wait_until(|| sink_recorder.attempts() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink_recorder.attempts(), 1);
    assert_eq!(sink_recorder.sent_count(), 0);

    gate.add_permits(20);
    wait_until(|| sink_recorder.sent_count() == 20).await;

    relay.shutdown_signal().fire(ShutdownReason::Signal("SIGTERM"));
    let outcome = relay.run().await;

    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(sink_recorder.sent_data(), expected);
    let buffer = outcome.buffer.unwrap();
    assert_eq!(buffer.dropped, 0);
    assert!(buffer.backpressure_events > 0);
}

#[tokio::test]
async fn test_unformattable_message_is_skipped() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, publisher, _) = MockBus::new();

    let relay = Relay::start(
        settings(10),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();

    publish(&publisher, "a", "before");
    publisher
        .unbounded_send(BusMessage::new("bin", vec![0xc3, 0x28]))
        .unwrap();
    publish(&publisher, "a", "after");
    wait_until(|| sink_recorder.sent_count() == 2).await;

    relay.shutdown_signal().fire(ShutdownReason::Signal("SIGTERM"));
    let outcome = relay.run().await;

    assert_eq!(sink_recorder.sent_data(), vec!["before", "after"]);
    assert_eq!(sink_recorder.attempts(), 2);
    assert_eq!(outcome.forwarder.skipped, 1);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn test_raw_format_forwards_payload_bytes() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, publisher, _) = MockBus::new();

    let relay = Relay::start(
        RelaySettings {
            entry_format: EntryFormat::Raw,
            ..settings(10)
        },
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();

    publish(&publisher, "a", "plain text");
    publish(&publisher, "a", "");
    publish(&publisher, "a", "more");
    wait_until(|| sink_recorder.sent_count() == 2).await;

    relay.shutdown_signal().fire(ShutdownReason::Signal("SIGTERM"));
    let outcome = relay.run().await;

    assert_eq!(sink_recorder.sent(), vec![b"plain text".to_vec(), b"more".to_vec()]);
    assert_eq!(outcome.forwarder.skipped, 1);
}

#[tokio::test]
async fn test_send_failure_tears_down_once() {
    let (sink, sink_recorder) = MockSink::new();
    let sink = sink.failing_on(2);
    let (bus, publisher, bus_recorder) = MockBus::new();

    let relay = Relay::start(
        settings(100),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();
    let state = relay.state();

    for i in 0..10 {
        publish(&publisher, "a", &i.to_string());
    }

    let outcome = tokio::time::timeout(Duration::from_secs(2), relay.run())
        .await
        .unwrap();

    assert_eq!(outcome.reason, ShutdownReason::SendFailure);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.forwarder.forwarded, 1);
    assert_eq!(outcome.forwarder.failed, 1);
    assert_eq!(sink_recorder.sent_data(), vec!["0"]);

    // No further sends after the failing one.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sink_recorder.attempts(), 2);
    assert_eq!(sink_recorder.closes(), 1);
    assert_eq!(bus_recorder.closes(), 1);
    assert_eq!(state.get(), RelayState::Stopped);
}

#[tokio::test]
async fn test_signal_while_idle_exits_cleanly() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, _publisher, bus_recorder) = MockBus::new();
    let shutdown = ShutdownSignal::new();

    let relay = Relay::start(
        settings(10),
        shutdown.clone(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();
    let state = relay.state();

    let run = tokio::spawn(relay.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(shutdown.fire(ShutdownReason::Signal("SIGINT")));

    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.abandoned, 0);
    assert_eq!(sink_recorder.attempts(), 0);
    assert_eq!(sink_recorder.closes(), 1);
    assert_eq!(bus_recorder.closes(), 1);
    assert_eq!(state.get(), RelayState::Stopped);
}

#[tokio::test]
async fn test_subscription_end_stops_relay() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, publisher, bus_recorder) = MockBus::new();

    let relay = Relay::start(
        settings(10),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await
    .unwrap();

    publish(&publisher, "a", "last words");
    wait_until(|| sink_recorder.sent_count() == 1).await;
    drop(publisher);

    let outcome = tokio::time::timeout(Duration::from_secs(2), relay.run())
        .await
        .unwrap();

    assert_eq!(outcome.reason, ShutdownReason::BusClosed);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(sink_recorder.closes(), 1);
    assert_eq!(bus_recorder.closes(), 1);
}

#[tokio::test]
async fn test_unreachable_sink_never_touches_bus() {
    let bus_contacted = Arc::new(AtomicBool::new(false));
    let (bus, _publisher, bus_recorder) = MockBus::new();

    let dial_sink = async {
        Err::<common::MockSink, _>(RelayError::SinkConnection {
            endpoint: "127.0.0.1:1".to_string(),
            source: SinkError::ConnectTimeout {
                endpoint: "127.0.0.1:1".to_string(),
                timeout: Duration::from_secs(1),
            },
        })
    };
    let connect_bus = {
        let bus_contacted = bus_contacted.clone();
        async move {
            bus_contacted.store(true, Ordering::SeqCst);
            Ok::<_, RelayError>(bus)
        }
    };

    let result = Relay::start(
        settings(1000),
        ShutdownSignal::new(),
        Span::none(),
        dial_sink,
        connect_bus,
    )
    .await;

    assert!(matches!(result, Err(RelayError::SinkConnection { .. })));
    assert!(!bus_contacted.load(Ordering::SeqCst));
    assert_eq!(bus_recorder.subscribes(), 0);
}

#[tokio::test]
async fn test_bus_connect_failure_closes_sink() {
    let (sink, sink_recorder) = MockSink::new();

    let result = Relay::start(
        settings(10),
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        async {
            Err::<common::MockBus, _>(RelayError::BusConnection {
                uri: "nats://127.0.0.1:1".to_string(),
                source: BusError::ConnectionFailed("connection refused".to_string()),
            })
        },
    )
    .await;

    assert!(matches!(result, Err(RelayError::BusConnection { .. })));
    assert_eq!(sink_recorder.closes(), 1);
}

#[tokio::test]
async fn test_subscribe_failure_closes_both_connections() {
    let (sink, sink_recorder) = MockSink::new();
    let (bus, _publisher, bus_recorder) = MockBus::new();
    let bus = bus.failing_subscribe();

    let result = Relay::start(
        RelaySettings {
            subject: "restricted.>".to_string(),
            ..settings(10)
        },
        ShutdownSignal::new(),
        Span::none(),
        ready(sink),
        ready(bus),
    )
    .await;

    match result {
        Err(RelayError::Subscribe { subject, .. }) => assert_eq!(subject, "restricted.>"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("subscribe failure must abort startup"),
    }
    assert_eq!(sink_recorder.closes(), 1);
    assert_eq!(bus_recorder.subscribes(), 1);
    assert_eq!(bus_recorder.closes(), 1);
}

#[tokio::test]
async fn test_relay_to_tcp_syslog_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = SyslogConfig {
        address: listener.local_addr().unwrap().to_string(),
        tag: "relay-e2e".to_string(),
        ..Default::default()
    };

    let collector = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line);
        }
        received
    });

    let (bus, publisher, _) = MockBus::new();
    let dial_sink = async {
        SyslogSink::dial(&config, Span::none())
            .await
            .map_err(|source| RelayError::SinkConnection {
                endpoint: config.address.clone(),
                source,
            })
    };

    let relay = Relay::start(
        settings(10),
        ShutdownSignal::new(),
        Span::none(),
        dial_sink,
        ready(bus),
    )
    .await
    .unwrap();

    publisher
        .unbounded_send(BusMessage::new("orders.created", "{\"id\":1}").with_reply("_INBOX.7"))
        .unwrap();
    publish(&publisher, "orders.deleted", "gone");

    let shutdown = relay.shutdown_signal();
    let run = tokio::spawn(relay.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.fire(ShutdownReason::Signal("SIGTERM"));
    let outcome = run.await.unwrap();
    assert_eq!(outcome.forwarder.forwarded, 2);
    let sink_stats = outcome.sink.expect("syslog sink reports write stats");
    assert_eq!(sink_stats.entries_sent, 2);
    assert_eq!(sink_stats.entries_failed, 0);
    assert!(sink_stats.bytes_sent > 0);

    let received = tokio::time::timeout(Duration::from_secs(2), collector)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.len(), 2);
    assert!(received[0].starts_with("<6>"));
    assert!(received[0].contains(" relay-e2e["));

    let (_, body) = received[0].split_once("]: ").unwrap();
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(value["Data"], "{\"id\":1}");
    assert_eq!(value["Reply"], "_INBOX.7");
    assert_eq!(value["Subject"], "orders.created");
    assert!(received[1].ends_with(r#"{"Data":"gone","Reply":"","Subject":"orders.deleted"}"#));
}
