//! End-to-end delivery scenarios through the public `CommsEngine` interface
//!
//! Covers direct delivery, out-of-range drops, one-hop broadcast fan-out,
//! listener dispatch, history bounding, and retry submission over the real
//! engine. Link outcomes are probabilistic by design, so scenario assertions
//! either hold for every outcome or use repetition with wide statistical
//! margins under a fixed RNG seed.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swarmlink::{
        AgentId, AgentState, CommsConfig, CommsEngine, HistoryCapacity, Message, MessageMetadata,
        MessageStatus, MessageSink, MessageType, Position, Priority, RetryPolicy, SimulatorConfig,
    };

    fn lossless_simulator(range: f64) -> SimulatorConfig {
        SimulatorConfig {
            range,
            failure_rate: 0.0,
            interference_level: 0.0,
            base_latency_ms: 100.0,
            latency_variation_ms: 0.0,
        }
    }

    fn engine_with_seed(seed: u64, range: f64) -> CommsEngine {
        let config = CommsConfig::builder()
            .simulator(lossless_simulator(range))
            .build()
            .unwrap();
        CommsEngine::with_seed(config, seed).unwrap()
    }

    fn snapshot(states: Vec<AgentState>) -> HashMap<AgentId, AgentState> {
        states.into_iter().map(|s| (s.id, s)).collect()
    }

    fn position_update() -> Message {
        Message::new(
            MessageType::PositionUpdate,
            bytes::Bytes::from_static(b"x,y"),
            MessageMetadata::with_priority(Priority::try_new(3).unwrap()).with_ttl_ms(30_000),
        )
    }

    fn status_update() -> Message {
        Message::new(
            MessageType::StatusUpdate,
            bytes::Bytes::from_static(b"ok"),
            MessageMetadata::default().with_ttl_ms(30_000),
        )
    }

    #[test_log::test(tokio::test)]
    async fn direct_delivery_records_history_with_link_quality() {
        let engine = engine_with_seed(101, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(50.0, 0.0)),
        ]));

        let attempts = 40;
        for _ in 0..attempts {
            assert!(
                engine
                    .send_message(AgentId::new(1), AgentId::new(2), position_update())
                    .await
            );
        }
        let processed = engine.process_messages().await;
        assert_eq!(processed, attempts);

        let history = engine.history_snapshot();
        // Residual signal-dependent loss is ~15% at half range; forty tries
        // leave the failure-everywhere case more than six sigma away.
        assert!(history.len() >= 20, "only {} deliveries", history.len());
        for delivery in &history {
            assert_eq!(delivery.receiver, AgentId::new(2));
            assert_eq!(delivery.original_sender, AgentId::new(1));
            assert!(delivery.route_path.is_empty());
            let signal = delivery.signal_strength.as_f64();
            assert!((0.25..=0.75).contains(&signal), "signal {signal} off nominal");
            // Delay is base 100ms plus 25ms distance share, no jitter.
            assert!(delivery.transmission_delay_ms >= 125);
        }
        assert_eq!(engine.pending_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn out_of_range_delivery_drops_silently() {
        let engine = engine_with_seed(102, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(200.0, 0.0)),
        ]));

        let message = position_update();
        let id = message.id;
        assert!(
            engine
                .send_message(AgentId::new(1), AgentId::new(2), message)
                .await
        );
        engine.process_messages().await;

        assert!(engine.history_snapshot().is_empty());
        assert_eq!(engine.message_status(id), MessageStatus::Failed);
    }

    #[test_log::test(tokio::test)]
    async fn unknown_positions_drop_without_history_entries() {
        let engine = engine_with_seed(103, 100.0);
        let mut blind = AgentState::new(AgentId::new(2), Position::new(10.0, 0.0));
        blind.position = None;
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            blind,
        ]));

        assert!(
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await
        );
        // Receiver entirely absent from the snapshot.
        assert!(
            engine
                .send_message(AgentId::new(1), AgentId::new(9), status_update())
                .await
        );
        engine.process_messages().await;

        assert!(engine.history_snapshot().is_empty());
        assert_eq!(engine.stats().dropped, 2);
    }

    #[test_log::test(tokio::test)]
    async fn broadcast_reaches_communicating_neighbors_only() {
        let engine = engine_with_seed(104, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(40.0, 0.0)),
            AgentState::new(AgentId::new(3), Position::new(-40.0, 0.0)),
            AgentState::new(AgentId::new(4), Position::new(500.0, 0.0)),
        ]));

        for _ in 0..20 {
            assert!(
                engine
                    .send_message(AgentId::new(1), AgentId::broadcast(), status_update())
                    .await
            );
        }
        engine.process_messages().await;

        let history = engine.history_snapshot();
        assert!(!history.is_empty());
        assert!(history.iter().all(|d| d.route_path.is_empty()));
        assert!(history.iter().all(|d| d.receiver != AgentId::new(4)));
        assert!(history.iter().all(|d| d.receiver != AgentId::new(1)));
        assert!(history.iter().any(|d| d.receiver == AgentId::new(2)));
        assert!(history.iter().any(|d| d.receiver == AgentId::new(3)));
    }

    #[test_log::test(tokio::test)]
    async fn every_history_entry_triggers_exactly_one_listener_call() {
        let engine = engine_with_seed(105, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(20.0, 0.0)),
        ]));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        engine.register_listener(AgentId::new(2), move |incoming| {
            assert_eq!(incoming.receiver, AgentId::new(2));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..15 {
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await;
        }
        engine.process_messages().await;

        assert_eq!(calls.load(Ordering::SeqCst), engine.history_snapshot().len());
    }

    #[test_log::test(tokio::test)]
    async fn last_listener_registration_wins() {
        let engine = engine_with_seed(106, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(20.0, 0.0)),
        ]));

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&first);
        engine.register_listener(AgentId::new(2), move |_| {
            first_counter.fetch_add(1, Ordering::SeqCst);
        });
        let second_counter = Arc::clone(&second);
        engine.register_listener(AgentId::new(2), move |_| {
            second_counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..10 {
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await;
        }
        engine.process_messages().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(
            second.load(Ordering::SeqCst),
            engine.history_snapshot().len()
        );
    }

    #[test_log::test(tokio::test)]
    async fn panicking_listener_does_not_disturb_other_deliveries() {
        let engine = engine_with_seed(107, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(30.0, 0.0)),
            AgentState::new(AgentId::new(3), Position::new(-30.0, 0.0)),
        ]));

        engine.register_listener(AgentId::new(2), |_| panic!("listener exploded"));
        let other_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&other_calls);
        engine.register_listener(AgentId::new(3), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..15 {
            engine
                .send_message(AgentId::new(1), AgentId::broadcast(), status_update())
                .await;
        }
        engine.process_messages().await;

        let history = engine.history_snapshot();
        assert!(history.iter().any(|d| d.receiver == AgentId::new(2)));
        let to_third = history.iter().filter(|d| d.receiver == AgentId::new(3)).count();
        assert!(to_third > 0);
        assert_eq!(other_calls.load(Ordering::SeqCst), to_third);
    }

    #[test_log::test(tokio::test)]
    async fn history_never_exceeds_its_capacity() {
        let config = CommsConfig::builder()
            .simulator(lossless_simulator(100.0))
            .history_capacity(HistoryCapacity::try_new(5).unwrap())
            .build()
            .unwrap();
        let engine = CommsEngine::with_seed(config, 108).unwrap();
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));

        for _ in 0..40 {
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await;
        }
        engine.process_messages().await;

        assert_eq!(engine.history_snapshot().len(), 5);
    }

    #[test_log::test(tokio::test)]
    async fn bounded_processing_leaves_the_rest_pending() {
        let engine = engine_with_seed(109, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));

        for _ in 0..8 {
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await;
        }
        assert_eq!(engine.process_up_to(3).await, 3);
        assert_eq!(engine.pending_count(), 5);
        assert_eq!(engine.process_messages().await, 5);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn expired_submissions_are_rejected_and_counted() {
        let engine = engine_with_seed(110, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));

        let message = Message::new(
            MessageType::StatusUpdate,
            bytes::Bytes::new(),
            MessageMetadata::default().with_ttl_ms(0),
        );
        let id = message.id;
        assert!(
            !engine
                .send_message(AgentId::new(1), AgentId::new(2), message)
                .await
        );
        assert_eq!(engine.message_status(id), MessageStatus::Expired);
        assert_eq!(engine.queue_statistics().expired, 1);
    }

    #[test_log::test(tokio::test)]
    async fn critical_sends_land_in_the_queue_through_the_retry_policy() {
        let engine = Arc::new(engine_with_seed(111, 100.0));
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));

        let policy = RetryPolicy::new(
            Arc::clone(&engine) as Arc<dyn MessageSink>,
            engine.config(),
        );
        let message = Message::new(
            MessageType::EmergencyAlert,
            bytes::Bytes::from_static(b"low battery"),
            MessageMetadata::with_priority(Priority::try_new(1).unwrap()).with_ttl_ms(30_000),
        );
        let outgoing = swarmlink::OutgoingMessage::new(
            AgentId::new(1),
            AgentId::new(2),
            message,
            swarmlink::MaxHops::default(),
        );

        assert!(policy.send_critical(outgoing).await);
        assert_eq!(engine.pending_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn metrics_reflect_recent_deliveries_and_backlog() {
        let engine = engine_with_seed(112, 100.0);
        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));

        for _ in 0..20 {
            engine
                .send_message(AgentId::new(1), AgentId::new(2), status_update())
                .await;
        }
        engine.process_messages().await;

        let metrics = engine.metrics_snapshot();
        assert_eq!(metrics.pending_messages, 0);
        assert!(metrics.failure_rate.abs() < f64::EPSILON);
        // Fresh deliveries sit inside the one-second window.
        assert!(metrics.messages_per_second > 0.0);

        let connections = engine.active_connections();
        assert_eq!(connections.len(), 1);
        assert!(connections[0].message_count > 0);
        assert!(connections[0].average_latency_ms >= 100.0);
    }

    #[test_log::test(tokio::test)]
    async fn health_reflects_topology_and_queue_state() {
        let engine = engine_with_seed(113, 100.0);
        assert!(matches!(
            engine.health_check(),
            swarmlink::HealthStatus::Degraded { .. }
        ));

        engine.update_topology(&snapshot(vec![
            AgentState::new(AgentId::new(1), Position::new(0.0, 0.0)),
            AgentState::new(AgentId::new(2), Position::new(10.0, 0.0)),
        ]));
        assert_eq!(engine.health_check(), swarmlink::HealthStatus::Healthy);
    }
}
