use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use glam::Vec3;

use arena::net::SERVER_IDENTITY;
use arena::pickup::PickupSettings;
use arena::sync::{Target, TickOutput};
use arena::{
    ClientSync, Identity, InputSample, Message, NetEvent, PickupKind, ServerSync, SyncConfig,
    VehicleKind, VehicleSnapshot,
};

/// In-process server with clients wired to its output, mirroring what the
/// dispatcher does for broadcasts and unicasts.
struct Session {
    server: ServerSync,
    clients: HashMap<Identity, ClientSync>,
    joined: Vec<Identity>,
    inbox: Vec<NetEvent>,
}

impl Session {
    fn new(config: SyncConfig) -> Self {
        Self {
            server: ServerSync::new(config),
            clients: HashMap::new(),
            joined: Vec::new(),
            inbox: Vec::new(),
        }
    }

    fn send(&mut self, from: Identity, message: Message) {
        self.inbox.push(NetEvent::Message { from, message });
    }

    fn connect(&mut self, identity: Identity, nickname: &str) {
        let mut client = ClientSync::headless(16);
        let join = client.join_request(nickname, None);
        self.clients.insert(identity, client);
        self.send(identity, join);
    }

    fn tick(&mut self) -> TickOutput {
        let inbox = std::mem::take(&mut self.inbox);
        let output = self.server.tick(inbox);

        for out in &output.messages {
            let targets: Vec<Identity> = match out.target {
                Target::All => self.joined.clone(),
                Target::One(identity) => vec![identity],
            };
            if let (Target::One(identity), Message::JoinAccepted { .. }) = (out.target, &out.message) {
                self.joined.push(identity);
            }
            for identity in targets {
                if let Some(client) = self.clients.get_mut(&identity) {
                    client.handle(vec![NetEvent::Message {
                        from: SERVER_IDENTITY,
                        message: out.message.clone(),
                    }]);
                }
            }
        }
        output
    }

    fn client(&self, identity: Identity) -> &ClientSync {
        &self.clients[&identity]
    }

    fn drive(&mut self, identity: Identity, input: InputSample) {
        let message = self
            .clients
            .get_mut(&identity)
            .and_then(|c| c.sample_input(input));
        if let Some(message) = message {
            self.send(identity, message);
        }
    }

    /// Two joined players, each with a vehicle parked far apart.
    fn with_two_drivers(config: SyncConfig) -> Self {
        let mut session = Self::new(config);
        session.connect(A, "alpha");
        session.connect(B, "bravo");
        session.tick();

        for identity in [A, B] {
            session.send(
                identity,
                Message::SpawnRequest {
                    vehicle: VehicleKind::Buggy,
                },
            );
        }
        session.tick();

        session.park(A, Vec3::new(-20.0, 0.6, 0.0));
        session.park(B, Vec3::new(20.0, 0.6, 0.0));
        session
    }

    fn park(&mut self, identity: Identity, position: Vec3) {
        let handle = self
            .server
            .players()
            .get_by_identity(identity)
            .and_then(|p| p.vehicle)
            .expect("no vehicle");
        let state = VehicleSnapshot::at_rest(position, 0.0);
        assert!(self.server.physics_mut().set_vehicle_state(handle, &state));
    }
}

const A: Identity = Identity(1);
const B: Identity = Identity(2);

fn quiet_config() -> SyncConfig {
    SyncConfig {
        seed: Some(42),
        pickups: PickupSettings {
            max_active: 0,
            ..PickupSettings::default()
        },
        ..SyncConfig::default()
    }
}

#[test]
fn test_forward_input_moves_only_its_vehicle() {
    let mut session = Session::with_two_drivers(quiet_config());
    // Settle on the ground before measuring.
    for _ in 0..5 {
        session.tick();
    }

    let start_a = session.server.vehicle_state(A).unwrap().position();
    let start_b = session.server.vehicle_state(B).unwrap().position();

    let mut last = 0.0;
    for _ in 0..10 {
        session.drive(A, InputSample::forward());
        session.drive(B, InputSample::IDLE);
        session.tick();

        let moved = session.server.vehicle_state(A).unwrap().position() - start_a;
        let displacement = Vec3::new(moved.x, 0.0, moved.z).length();
        assert!(displacement > last, "displacement {} not above {}", displacement, last);
        last = displacement;
    }

    let b = session.server.vehicle_state(B).unwrap().position();
    assert!(Vec3::new(b.x - start_b.x, 0.0, b.z - start_b.z).length() < 1e-3);

    // Clients converge on the server's view after the next batch.
    for _ in 0..3 {
        session.tick();
    }
    let server_a = session.server.vehicle_state(A).unwrap().position();
    let seen_by_b = session.client(B).vehicle_state(A).unwrap().position();
    assert!(seen_by_b.distance(server_a) < 1.0);
}

#[test]
fn test_random_pickup_rerolls_exactly_once() {
    let mut session = Session::with_two_drivers(quiet_config());
    let at_a = session.server.vehicle_state(A).unwrap().position();
    let random = session
        .server
        .spawn_pickup(PickupKind::Random, Vec3::new(at_a.x, 0.75, at_a.z))
        .unwrap();

    let output = session.tick();

    let collected: Vec<(u32, u32)> = output
        .broadcasts()
        .filter_map(|m| match m {
            Message::PickupCollect { pickup, collector } => Some((*pickup, *collector)),
            _ => None,
        })
        .collect();
    assert_eq!(collected, vec![(random.raw(), A.0)]);

    let rerolled: Vec<(u32, PickupKind)> = output
        .broadcasts()
        .filter_map(|m| match m {
            Message::PickupSpawn { pickup, kind, .. } if *pickup != random.raw() => Some((*pickup, *kind)),
            _ => None,
        })
        .collect();
    assert_eq!(rerolled.len(), 1);
    assert!(rerolled[0].1.is_concrete());

    // The collected id is gone for good.
    for _ in 0..5 {
        let output = session.tick();
        assert!(!output.broadcasts().any(|m| matches!(
            m,
            Message::PickupSpawn { pickup, .. } if *pickup == random.raw()
        )));
    }
    assert!(session.server.pickups().get(random).is_none());
    assert!(!session.client(B).pickups().contains_key(&random.raw()));
}

#[test]
fn test_players_leaving_next_to_pickups() {
    let mut session = Session::with_two_drivers(quiet_config());
    let at_b = session.server.vehicle_state(B).unwrap().position();
    let pickup = session
        .server
        .spawn_pickup(PickupKind::Speed, Vec3::new(at_b.x, 0.75, at_b.z))
        .unwrap();

    // B leaves before collection runs, so nothing dangles on its identity.
    session.send(B, Message::Quit);
    session.tick();
    assert!(!session.server.players().contains(B));

    let at_a = session.server.vehicle_state(A).unwrap().position();
    let second = session
        .server
        .spawn_pickup(PickupKind::Health, Vec3::new(at_a.x, 0.75, at_a.z))
        .unwrap();
    session.send(A, Message::Quit);
    let output = session.tick();

    assert!(output.closed.contains(&A));
    assert!(session.server.players().is_empty());
    assert_eq!(session.server.physics().vehicle_count(), 0);
    session.tick();
    assert!(session.server.pickups().get(second).is_some());
    // Either reaped after collection or never touched; never dangling.
    if let Some(p) = session.server.pickups().get(pickup) {
        assert!(!p.collected);
    }
}

#[test]
fn test_speed_pickup_boosts_collector() {
    let mut session = Session::with_two_drivers(quiet_config());
    let at_a = session.server.vehicle_state(A).unwrap().position();
    session
        .server
        .spawn_pickup(PickupKind::Speed, Vec3::new(at_a.x, 0.75, at_a.z))
        .unwrap();
    session.tick();

    let a = session.server.players().get_by_identity(A).unwrap();
    let b = session.server.players().get_by_identity(B).unwrap();
    assert!(a.effects.speed_ticks > 0);
    assert_eq!(b.effects.speed_ticks, 0);
}

#[test]
fn test_clients_ignore_stale_batches() {
    let mut session = Session::with_two_drivers(quiet_config());
    for _ in 0..6 {
        session.tick();
    }
    let seen = session.client(B).vehicle_state(A).unwrap();
    let tick = session
        .client(B)
        .players()
        .get_by_identity(A)
        .and_then(|p| p.last_snapshot_tick)
        .unwrap();

    let bogus = VehicleSnapshot::at_rest(Vec3::new(999.0, 0.6, 999.0), 0.0);
    let client = session.clients.get_mut(&B).unwrap();
    client.handle_message(Message::VehicleSnapshotBatch {
        tick: tick.wrapping_sub(1),
        entries: vec![arena::net::SnapshotEntry {
            player: A.0,
            snapshot: bogus,
        }],
    });

    let after = session.client(B).vehicle_state(A).unwrap();
    assert_eq!(after.position(), seen.position());
}

#[test]
fn test_late_joiner_receives_world() {
    let mut config = quiet_config();
    config.pickups.max_active = 4;
    let mut session = Session::with_two_drivers(config);
    session.send(A, Message::TeamSelect { team: arena::Team::Red });
    session.tick();

    let c = Identity(3);
    session.connect(c, "charlie");
    session.tick();

    let late = session.client(c);
    assert!(late.is_joined());
    assert_eq!(late.players().len(), 3);
    assert!(late.vehicle_state(A).is_some());
    assert!(late.vehicle_state(B).is_some());
    assert_eq!(late.pickups().len(), session.server.pickups().active().count());

    let alpha = late.players().get_by_identity(A).unwrap();
    assert_eq!(alpha.team, arena::Team::Red);
    assert!(alpha.is_vip);
}

#[test]
fn test_join_rejected_when_full() {
    let config = SyncConfig {
        max_players: 1,
        ..quiet_config()
    };
    let mut session = Session::new(config);
    session.connect(A, "alpha");
    session.connect(B, "bravo");
    let output = session.tick();

    assert!(session.client(A).is_joined());
    assert_eq!(
        session.client(B).state(),
        &arena::sync::SessionState::Rejected("Server full".to_string())
    );
    assert_eq!(output.closed, vec![B]);
}

#[test]
fn test_ramming_kills_and_scores() {
    let mut session = Session::with_two_drivers(quiet_config());
    let handle = session
        .server
        .players()
        .get_by_identity(A)
        .and_then(|p| p.vehicle)
        .unwrap();

    // A faces +X and is launched into a parked B; each pass starts from
    // apart so every hit is a fresh contact.
    let mut died = false;
    for _ in 0..5 {
        session.park(A, Vec3::new(-20.0, 0.6, 0.0));
        session.park(B, Vec3::new(1.5, 0.6, 0.0));
        session.tick();

        let mut launch = VehicleSnapshot::at_rest(Vec3::new(-1.6, 0.6, 0.0), -FRAC_PI_2);
        launch.linear_velocity = [25.0, 0.0, 0.0];
        assert!(session.server.physics_mut().set_vehicle_state(handle, &launch));

        let output = session.tick();
        if output
            .broadcasts()
            .any(|m| matches!(m, Message::PlayerDied { player: 2, killer: Some(1) }))
        {
            died = true;
            break;
        }
        let b = session.server.players().get_by_identity(B).unwrap();
        assert!(b.health < 100.0);
    }

    assert!(died);
    let a = session.server.players().get_by_identity(A).unwrap();
    assert_eq!(a.round_score, 1);
    assert!(!session.server.players().get_by_identity(B).unwrap().alive);
    assert_eq!(session.client(A).scores()[0].player, A.0);
    assert_eq!(session.client(A).scores()[0].round_score, 1);
}
