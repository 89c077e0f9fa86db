//! Integration tests for the Aspen session
//!
//! These tests run a session against a virtual router served on a loopback
//! TCP listener and verify:
//! - Connect, subscribe and status polling
//! - Routing commands and the resulting table updates
//! - Unsolicited updates made at the router
//! - Device errors, socket failures, dropped sends and teardown
//! - Observers that fall behind or call back into the session

use std::net::SocketAddr;
use std::time::Duration;

use aspen_protocol::{Level, LevelSelector, RouterCommand};
use aspen_session::{
    spawn_session, ConnectionStatus, SessionConfig, SessionError, SessionEvent, SessionHandle,
    SessionState,
};
use aspen_sim::{serve_tcp, VirtualRouter, VirtualRouterCommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Serve a fresh virtual router on an ephemeral loopback port
    pub async fn start_router() -> (SocketAddr, mpsc::Sender<VirtualRouterCommand>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        tokio::spawn(serve_tcp(listener, VirtualRouter::new("Test"), cmd_rx));
        (addr, cmd_tx)
    }

    /// Session settings pointing at the router, with polling out of the way
    pub fn config_for(addr: SocketAddr) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_secs(3600),
            ..SessionConfig::new(addr.ip().to_string(), addr.port())
        }
    }

    /// Wait for the first event matching `pred`, skipping the rest
    pub async fn wait_for(
        events: &mut mpsc::Receiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_for_status(
        events: &mut mpsc::Receiver<SessionEvent>,
        status: ConnectionStatus,
    ) -> SessionEvent {
        wait_for(events, |e| e.status() == Some(status)).await
    }

    pub async fn wait_for_routing(events: &mut mpsc::Receiver<SessionEvent>, output: u16) {
        wait_for(
            events,
            |e| matches!(e, SessionEvent::RoutingChanged { output: o, .. } if *o == output),
        )
        .await;
    }

    /// Start a session and wait until the router has taken the subscription
    ///
    /// The `**U2!!` subscription goes out on connect; a routed echo proves the
    /// router processed it.
    pub async fn connected_session(
        addr: SocketAddr,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (session, mut events, _task) = spawn_session(1024);
        session.init(config_for(addr)).await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Ok).await;

        session.connect(1, 1).await.unwrap();
        wait_for_routing(&mut events, 1).await;
        (session, events)
    }
}

use helpers::*;

// ============================================================================
// Connection Tests
// ============================================================================

mod connection_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_reports_connecting_then_ok() {
        let (addr, _router) = start_router().await;
        let (session, mut events, _task) = spawn_session(1024);

        session.init(config_for(addr)).await.unwrap();
        let first = wait_for(&mut events, |e| e.status().is_some()).await;
        assert_eq!(first.status(), Some(ConnectionStatus::Connecting));
        wait_for_status(&mut events, ConnectionStatus::Ok).await;

        assert_eq!(session.state().await.unwrap(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_subscription_is_first_command() {
        let (addr, _router) = start_router().await;
        let (session, mut events, _task) = spawn_session(1024);

        session.init(config_for(addr)).await.unwrap();
        let sent = wait_for(&mut events, |e| matches!(e, SessionEvent::DataOut { .. })).await;
        match sent {
            SessionEvent::DataOut { data } => assert_eq!(data, b"**U2!!"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_router_reports_error() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let (session, mut events, _task) = spawn_session(64);

        session.init(config_for(addr)).await.unwrap();
        match wait_for_status(&mut events, ConnectionStatus::Error).await {
            SessionEvent::StatusChanged { detail, .. } => assert!(detail.is_some()),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.state().await.unwrap(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_router_hangup_reports_disconnected() {
        let (addr, router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        router.send(VirtualRouterCommand::Disconnect).await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Disconnected).await;
        assert_eq!(session.state().await.unwrap(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_destroy_then_send_is_dropped() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session.destroy().await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Disconnected).await;

        session.connect(2, 3).await.unwrap();
        let warning = wait_for(&mut events, |e| matches!(e, SessionEvent::Warning { .. })).await;
        assert!(matches!(
            warning,
            SessionEvent::Warning {
                error: SessionError::WriteWhileDisconnected
            }
        ));
    }

    #[tokio::test]
    async fn test_config_update_reconnects_with_empty_table() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;
        assert!(!session.snapshot().await.unwrap().is_empty());

        session.config_updated(config_for(addr)).await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Connecting).await;
        wait_for_status(&mut events, ConnectionStatus::Ok).await;

        assert!(session.snapshot().await.unwrap().is_empty());
        assert!(!session.is_routed(1, 1, LevelSelector::Any).await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let (session, _events, task) = spawn_session(16);
        session.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state().await, Err(SessionError::ActorUnavailable));
    }
}

// ============================================================================
// Routing Tests
// ============================================================================

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_afv_connect_updates_all_levels() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session.connect(7, 3).await.unwrap();
        wait_for_routing(&mut events, 7).await;

        assert!(session.is_routed(7, 3, LevelSelector::Any).await.unwrap());
        for level in Level::ALL {
            assert!(session.is_routed(7, 3, level.into()).await.unwrap());
        }
        assert!(!session.is_routed(7, 4, LevelSelector::Any).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_level_crosspoint() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session.crosspoint(5, 12, Some(Level::Level2)).await.unwrap();
        wait_for_routing(&mut events, 5).await;

        assert!(session.is_routed(5, 12, Level::Level2.into()).await.unwrap());
        assert!(session.is_routed(5, 12, LevelSelector::Any).await.unwrap());
        // Levels 1 and 3 have not been reported yet
        assert!(!session.is_routed(5, 12, Level::Level1.into()).await.unwrap());
        let table = session.snapshot().await.unwrap();
        assert_eq!(table.query(5, Level::Level3), None);
    }

    #[tokio::test]
    async fn test_multi_level_leaves_zero_levels_alone() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session.multi_level(4, vec![3, 4, 0]).await.unwrap();
        wait_for(
            &mut events,
            |e| matches!(e, SessionEvent::RoutingChanged { output: 4, .. }),
        )
        .await;
        wait_for_routing(&mut events, 4).await;

        let table = session.snapshot().await.unwrap();
        assert_eq!(table.query(4, Level::Level1), Some(3));
        assert_eq!(table.query(4, Level::Level2), Some(4));
        assert_eq!(table.query(4, Level::Level3), None);
    }

    #[tokio::test]
    async fn test_status_poll_fills_table() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session.crosspoint(2, 9, Some(Level::Level3)).await.unwrap();
        wait_for_routing(&mut events, 2).await;
        session.poll_now().await.unwrap();
        wait_for_routing(&mut events, 72).await;

        let table = session.snapshot().await.unwrap();
        assert_eq!(table.len(), 72);
        assert_eq!(table.query(2, Level::Level1), Some(2));
        assert_eq!(table.query(2, Level::Level3), Some(9));
        assert!(session.is_routed(40, 40, LevelSelector::Any).await.unwrap());
    }

    #[tokio::test]
    async fn test_poll_timer_requests_status() {
        let (addr, _router) = start_router().await;
        let (session, mut events, _task) = spawn_session(1024);

        let config = SessionConfig {
            poll_interval: Duration::from_millis(100),
            ..config_for(addr)
        };
        session.init(config).await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Ok).await;

        let poll = wait_for(&mut events, |e| matches!(e, SessionEvent::DataOut { data } if data == b"**S!!")).await;
        assert!(poll.is_traffic());
        wait_for_routing(&mut events, 72).await;
    }

    #[tokio::test]
    async fn test_front_panel_change_is_pushed() {
        let (addr, router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        router
            .send(VirtualRouterCommand::FrontPanel {
                output: 9,
                input: 4,
                level: Some(Level::Level1),
            })
            .await
            .unwrap();
        wait_for_routing(&mut events, 9).await;

        assert!(session.is_routed(9, 4, Level::Level1.into()).await.unwrap());
    }
}

// ============================================================================
// Error Tests
// ============================================================================

mod error_tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_device_error_keeps_link() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session
            .send(RouterCommand::Connect {
                output: 99,
                input: 1,
            })
            .await
            .unwrap();
        match wait_for_status(&mut events, ConnectionStatus::Error).await {
            SessionEvent::StatusChanged { detail, .. } => {
                assert!(detail.unwrap_or_default().contains("ERROR"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.state().await.unwrap(), SessionState::Connected);

        // The link is still usable
        session.connect(3, 8).await.unwrap();
        wait_for_routing(&mut events, 3).await;
        assert!(session.is_routed(3, 8, LevelSelector::Any).await.unwrap());
    }

    #[tokio::test]
    async fn test_socket_reset_keeps_last_known_routing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (session, mut events, _task) = spawn_session(64);
        session
            .init(config_for(listener.local_addr().unwrap()))
            .await
            .unwrap();

        let (mut socket, _) = listener.accept().await.unwrap();
        wait_for_status(&mut events, ConnectionStatus::Ok).await;
        socket.write_all(b"** Y7,3 !!\r\n").await.unwrap();
        wait_for_routing(&mut events, 7).await;

        // Zero linger turns the close into a reset
        socket.set_linger(Some(Duration::ZERO)).unwrap();
        drop(socket);

        match wait_for_status(&mut events, ConnectionStatus::Error).await {
            SessionEvent::StatusChanged { detail, .. } => assert!(detail.is_some()),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.state().await.unwrap(), SessionState::Error);
        assert!(session.is_routed(7, 3, Level::Level1.into()).await.unwrap());
        assert!(session.is_routed(7, 3, Level::Level3.into()).await.unwrap());
    }
}

// ============================================================================
// Observer Tests
// ============================================================================

mod observer_tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    /// One crosspoint line per output and level, input equal to output
    fn crosspoint_burst() -> Vec<u8> {
        let mut burst = Vec::new();
        for output in 1..=72u16 {
            for level in Level::ALL {
                burst.extend_from_slice(
                    format!("** X{},{},{} !!\r\n", output, output, level.index()).as_bytes(),
                );
            }
        }
        burst
    }

    #[tokio::test]
    async fn test_request_from_event_loop_during_burst() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (session, mut events, _task) = spawn_session(8);
        session
            .init(config_for(listener.local_addr().unwrap()))
            .await
            .unwrap();

        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&crosspoint_burst()).await.unwrap();

        // React to the first change by asking the session, as a console does
        wait_for_routing(&mut events, 1).await;
        let table = tokio::time::timeout(Duration::from_secs(3), session.snapshot())
            .await
            .expect("session stalled on a full event channel")
            .unwrap();
        assert!(!table.is_empty());

        // Routing changes are held back, not dropped
        let mut last = None;
        for _ in 1..216 {
            last = Some(
                wait_for(&mut events, |e| {
                    matches!(e, SessionEvent::RoutingChanged { .. })
                })
                .await,
            );
        }
        match last {
            Some(SessionEvent::RoutingChanged { output, routing, .. }) => {
                assert_eq!(output, 72);
                for level in Level::ALL {
                    assert_eq!(routing.input(level), Some(72));
                }
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.snapshot().await.unwrap().len(), 72);
    }

    #[tokio::test]
    async fn test_routing_event_carries_new_routing() {
        let (addr, _router) = start_router().await;
        let (session, mut events) = connected_session(addr).await;

        session
            .crosspoint(6, 11, Some(Level::Level2))
            .await
            .unwrap();
        match wait_for(
            &mut events,
            |e| matches!(e, SessionEvent::RoutingChanged { output: 6, .. }),
        )
        .await
        {
            SessionEvent::RoutingChanged { routing, .. } => {
                assert_eq!(routing.input(Level::Level2), Some(11));
                let table = session.snapshot().await.unwrap();
                assert_eq!(table.get(6), Some(&routing));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
