use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use arena::net::{DisconnectReason, SERVER_IDENTITY};
use arena::sync::SessionState;
use arena::{
    ClientSync, DispatcherConfig, Identity, Message, NetEvent, ServerSync, SyncConfig,
    TransportDispatcher, VehicleKind,
};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn join(nickname: &str) -> Message {
    Message::Join {
        nickname: nickname.to_string(),
        password: None,
    }
}

/// Polls until `matches` accepts an event, flushing so acks keep flowing.
fn wait_for<F>(dispatcher: &mut TransportDispatcher, timeout_ms: u64, mut matches: F) -> Option<NetEvent>
where
    F: FnMut(&NetEvent) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let now = Instant::now();
        let found = dispatcher.poll(now).into_iter().find(|e| matches(e));
        dispatcher.flush(now);
        if found.is_some() {
            return found;
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

fn connect_client(server: &TransportDispatcher, nickname: &str) -> TransportDispatcher {
    let mut client = TransportDispatcher::connect(server.local_addr(), DispatcherConfig::default()).unwrap();
    let now = Instant::now();
    client.unicast(SERVER_IDENTITY, join(nickname), now);
    client.flush(now);
    client
}

#[test]
fn test_join_reaches_server_and_reply_returns() {
    let mut server = TransportDispatcher::bind(loopback(), DispatcherConfig::default()).unwrap();
    let mut client = connect_client(&server, "ace");

    let event = wait_for(&mut server, 2000, |e| matches!(e, NetEvent::Message { .. }))
        .expect("server saw nothing");
    let NetEvent::Message { from, message } = event else {
        unreachable!()
    };
    assert_eq!(from, Identity(1));
    assert_eq!(message, join("ace"));

    let now = Instant::now();
    server.unicast(
        from,
        Message::JoinAccepted {
            player: from.0,
            tick_rate: 60,
            broadcast_rate: 20,
        },
        now,
    );
    server.mark_joined(from);
    server.flush(now);

    let reply = wait_for(&mut client, 2000, |e| {
        matches!(
            e,
            NetEvent::Message {
                message: Message::JoinAccepted { .. },
                ..
            }
        )
    });
    assert!(reply.is_some());
    assert_eq!(server.joined_count(), 1);
}

#[test]
fn test_full_server_rejects_extra_peer() {
    let config = DispatcherConfig {
        max_peers: 1,
        ..DispatcherConfig::default()
    };
    let mut server = TransportDispatcher::bind(loopback(), config).unwrap();
    let _first = connect_client(&server, "first");
    assert!(wait_for(&mut server, 2000, |e| matches!(e, NetEvent::Message { .. })).is_some());

    let mut second = connect_client(&server, "second");
    let mut rejected = None;
    let start = Instant::now();
    while rejected.is_none() && start.elapsed() < Duration::from_secs(2) {
        let now = Instant::now();
        let _ = server.poll(now);
        server.flush(now);
        rejected = second.poll(now).into_iter().find(|e| {
            matches!(
                e,
                NetEvent::Message {
                    message: Message::JoinRejected { .. },
                    ..
                }
            )
        });
        second.flush(now);
        thread::sleep(Duration::from_millis(1));
    }

    match rejected {
        Some(NetEvent::Message {
            message: Message::JoinRejected { reason },
            ..
        }) => assert_eq!(reason, "Server full"),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(server.peer_count(), 1);
}

#[test]
fn test_reliable_messages_arrive_in_order() {
    let mut server = TransportDispatcher::bind(loopback(), DispatcherConfig::default()).unwrap();
    let mut client = connect_client(&server, "reader");
    wait_for(&mut server, 2000, |e| matches!(e, NetEvent::Message { .. })).expect("no join");
    server.mark_joined(Identity(1));

    let now = Instant::now();
    for i in 0..20 {
        server.broadcast(
            Message::ChatMessage {
                from: None,
                text: format!("line {}", i),
            },
            now,
        );
    }
    server.flush(now);

    let mut lines = Vec::new();
    let start = Instant::now();
    while lines.len() < 20 && start.elapsed() < Duration::from_secs(3) {
        let now = Instant::now();
        for event in client.poll(now) {
            if let NetEvent::Message {
                message: Message::ChatMessage { text, .. },
                ..
            } = event
            {
                lines.push(text);
            }
        }
        client.flush(now);
        let _ = server.poll(now);
        server.flush(now);
        thread::sleep(Duration::from_millis(1));
    }

    let expected: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
    assert_eq!(lines, expected);
}

#[test]
fn test_silent_peer_times_out() {
    let config = DispatcherConfig {
        timeout: Duration::from_millis(200),
        ..DispatcherConfig::default()
    };
    let mut server = TransportDispatcher::bind(loopback(), config).unwrap();
    let client = connect_client(&server, "ghost");
    wait_for(&mut server, 2000, |e| matches!(e, NetEvent::Message { .. })).expect("no join");
    drop(client);

    let event = wait_for(&mut server, 3000, |e| matches!(e, NetEvent::Disconnected { .. }));
    assert_eq!(
        event,
        Some(NetEvent::Disconnected {
            identity: Identity(1),
            reason: DisconnectReason::Timeout,
        })
    );
    assert_eq!(server.peer_count(), 0);
}

#[test]
fn test_malformed_datagram_counted() {
    let mut server = TransportDispatcher::bind(loopback(), DispatcherConfig::default()).unwrap();
    let socket = std::net::UdpSocket::bind(loopback()).unwrap();
    socket.send_to(&[0xde, 0xad, 0xbe, 0xef], server.local_addr()).unwrap();

    let start = Instant::now();
    while server.stats().malformed == 0 && start.elapsed() < Duration::from_secs(2) {
        assert!(server.poll(Instant::now()).is_empty());
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(server.stats().malformed, 1);
    assert_eq!(server.peer_count(), 0);
}

#[test]
fn test_session_over_udp() {
    let mut config = SyncConfig {
        seed: Some(5),
        ..SyncConfig::default()
    };
    config.pickups.max_active = 3;
    let mut sync = ServerSync::new(config);
    let mut server = TransportDispatcher::bind(loopback(), DispatcherConfig::default()).unwrap();
    let mut link = TransportDispatcher::connect(server.local_addr(), DispatcherConfig::default()).unwrap();

    let mut client = ClientSync::headless(16);
    let now = Instant::now();
    link.unicast(SERVER_IDENTITY, client.join_request("udp", None), now);
    link.flush(now);

    let mut spawn_sent = false;
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        let now = Instant::now();

        let events = server.poll(now);
        sync.tick(events).deliver(&mut server, now);
        server.flush(now);

        client.handle(link.poll(now));
        if client.is_joined() && !spawn_sent {
            link.unicast(
                SERVER_IDENTITY,
                Message::SpawnRequest {
                    vehicle: VehicleKind::Tank,
                },
                now,
            );
            spawn_sent = true;
        }
        if let Some(input) = client.sample_input(arena::InputSample::forward()) {
            link.unicast(SERVER_IDENTITY, input, now);
        }
        link.flush(now);

        let local = client.local_identity();
        if local.is_some_and(|id| client.vehicle_state(id).is_some()) && !client.pickups().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(client.state(), &SessionState::Joined);
    assert_eq!(client.local_identity(), Some(Identity(1)));
    assert!(client.vehicle_state(Identity(1)).is_some());
    assert!(!client.pickups().is_empty());
    assert!(client.pickups().len() <= 3);
    assert!(sync.players().get_by_identity(Identity(1)).unwrap().is_driving());
}

#[test]
fn test_idle_joined_client_outlives_timeout() {
    let mut config = SyncConfig {
        seed: Some(9),
        ..SyncConfig::default()
    };
    config.pickups.max_active = 0;
    let net = DispatcherConfig {
        timeout: Duration::from_millis(300),
        ..DispatcherConfig::default()
    };

    let mut sync = ServerSync::new(config);
    let mut server = TransportDispatcher::bind(loopback(), net.clone()).unwrap();
    let mut link = TransportDispatcher::connect(server.local_addr(), net).unwrap();

    let mut client = ClientSync::headless(16);
    let now = Instant::now();
    link.unicast(SERVER_IDENTITY, client.join_request("idle", None), now);
    link.flush(now);

    // Never spawns, so the server has no snapshots to send.
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(1500) {
        let now = Instant::now();

        let events = server.poll(now);
        sync.tick(events).deliver(&mut server, now);
        server.flush(now);

        client.handle(link.poll(now));
        if let Some(input) = client.sample_input(arena::InputSample::IDLE) {
            link.unicast(SERVER_IDENTITY, input, now);
        }
        link.flush(now);
        thread::sleep(Duration::from_millis(16));
    }

    assert_eq!(client.state(), &SessionState::Joined);
    assert!(sync.players().contains(Identity(1)));
    assert!(link.is_connected(SERVER_IDENTITY));
}
