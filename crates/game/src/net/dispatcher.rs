use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use super::connection::{PeerError, PeerTable};
use super::protocol::{DisconnectReason, Message, Packet, PacketHeader};
use super::stats::NetworkStats;
use super::transport::{Transport, TransportError};
use crate::player::Identity;

pub const SERVER_IDENTITY: Identity = Identity(0);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_peers: usize,
    pub timeout: Duration,
    pub resend_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_peers: 32,
            timeout: Duration::from_secs(10),
            resend_interval: Duration::from_millis(100),
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Message { from: Identity, message: Message },
    Disconnected { identity: Identity, reason: DisconnectReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Server,
    Client,
}

/// Turns datagrams into per-identity message events and back.
pub struct TransportDispatcher {
    transport: Transport,
    peers: PeerTable,
    config: DispatcherConfig,
    mode: Mode,
    malformed: u64,
}

impl TransportDispatcher {
    pub fn bind(addr: SocketAddr, config: DispatcherConfig) -> Result<Self, TransportError> {
        let transport = Transport::bind(addr, config.queue_capacity)?;
        log::info!("listening on {}", transport.local_addr());

        Ok(Self {
            transport,
            peers: PeerTable::new(config.max_peers, config.timeout),
            config,
            mode: Mode::Server,
            malformed: 0,
        })
    }

    pub fn connect(server: SocketAddr, config: DispatcherConfig) -> Result<Self, TransportError> {
        let local_ip = if server.ip().is_loopback() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let transport = Transport::bind(SocketAddr::new(local_ip, 0), config.queue_capacity)?;

        let mut peers = PeerTable::new(1, config.timeout);
        peers.insert(SERVER_IDENTITY, server, Instant::now()).joined = true;
        log::info!("connecting to {} from {}", server, transport.local_addr());

        Ok(Self {
            transport,
            peers,
            config,
            mode: Mode::Client,
            malformed: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn poll(&mut self, now: Instant) -> Vec<NetEvent> {
        let mut events = Vec::new();

        while let Some(datagram) = self.transport.try_recv() {
            let packet = match Packet::deserialize(&datagram.payload) {
                Ok(packet) => packet,
                Err(e) => {
                    self.malformed += 1;
                    log::warn!("dropping datagram from {}: {}", datagram.addr, e);
                    continue;
                }
            };

            let peer = match self.mode {
                Mode::Server => match self.peers.get_or_insert(datagram.addr, now) {
                    Ok(peer) => peer,
                    Err(PeerError::Full) => {
                        reject(&self.transport, datagram.addr, "Server full");
                        continue;
                    }
                },
                Mode::Client => {
                    let known = self
                        .peers
                        .identity_of(&datagram.addr)
                        .and_then(|identity| self.peers.get_mut(identity));
                    match known {
                        Some(peer) => peer,
                        None => {
                            log::debug!("ignoring datagram from unknown {}", datagram.addr);
                            continue;
                        }
                    }
                }
            };

            peer.touch(now);
            let from = peer.identity;
            for message in peer.channel.receive(packet, now) {
                events.push(NetEvent::Message { from, message });
            }
        }

        for identity in self.peers.sweep_timed_out(now) {
            log::info!("{} timed out", identity);
            events.push(NetEvent::Disconnected {
                identity,
                reason: DisconnectReason::Timeout,
            });
        }

        events
    }

    pub fn unicast(&mut self, identity: Identity, message: Message, now: Instant) -> bool {
        let Some(peer) = self.peers.get_mut(identity) else {
            return false;
        };

        if message.reliability().is_reliable() {
            peer.channel.queue_reliable(message);
            return true;
        }

        let addr = peer.addr;
        let packet = peer.channel.write_unreliable(message, now);
        send_packet(&self.transport, addr, &packet)
    }

    pub fn broadcast(&mut self, message: Message, now: Instant) -> usize {
        let targets: Vec<Identity> = self
            .peers
            .iter()
            .filter(|p| p.joined && !p.closing)
            .map(|p| p.identity)
            .collect();

        let mut sent = 0;
        for identity in targets {
            if self.unicast(identity, message.clone(), now) {
                sent += 1;
            }
        }
        sent
    }

    /// Heartbeats peers that are owed an ack or idle for a quarter of the timeout.
    pub fn flush(&mut self, now: Instant) {
        let resend = self.config.resend_interval;
        let keepalive = self.config.timeout / 4;

        for peer in self.peers.iter_mut() {
            let mut packets = peer.channel.collect_due(now, resend);
            if packets.is_empty()
                && (peer.channel.ack_owed() || peer.channel.is_idle(now, keepalive))
            {
                packets.push(peer.channel.write_unreliable(Message::Heartbeat, now));
            }
            for packet in &packets {
                send_packet(&self.transport, peer.addr, packet);
            }
        }

        let closing: Vec<Identity> = self
            .peers
            .iter()
            .filter(|p| p.closing)
            .map(|p| p.identity)
            .collect();
        for identity in closing {
            self.peers.remove(identity);
            log::debug!("closed {}", identity);
        }
    }

    pub fn mark_joined(&mut self, identity: Identity) -> bool {
        match self.peers.get_mut(identity) {
            Some(peer) => {
                peer.joined = true;
                true
            }
            None => false,
        }
    }

    pub fn close_after_flush(&mut self, identity: Identity) {
        if let Some(peer) = self.peers.get_mut(identity) {
            peer.closing = true;
            peer.joined = false;
        }
    }

    pub fn disconnect(&mut self, identity: Identity) -> bool {
        self.peers.remove(identity).is_some()
    }

    pub fn is_connected(&self, identity: Identity) -> bool {
        self.peers.get(identity).is_some()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn joined_count(&self) -> usize {
        self.peers.joined_count()
    }

    pub fn rtt_ms(&self, identity: Identity) -> Option<f32> {
        self.peers.get(identity).map(|p| p.channel.srtt_ms())
    }

    pub fn pending_reliable(&self) -> usize {
        self.peers.iter().map(|p| p.channel.pending_reliable()).sum()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = self.transport.stats();
        stats.malformed = self.malformed;

        let count = self.peers.len();
        if count > 0 {
            let total: f32 = self.peers.iter().map(|p| p.channel.srtt_ms()).sum();
            stats.rtt_ms = total / count as f32;
        }
        stats
    }
}

fn send_packet(transport: &Transport, addr: SocketAddr, packet: &Packet) -> bool {
    match packet.serialize() {
        Ok(bytes) => transport.try_send(addr, bytes),
        Err(e) => {
            log::warn!("cannot send {} to {}: {}", packet.message.name(), addr, e);
            false
        }
    }
}

fn reject(transport: &Transport, addr: SocketAddr, reason: &str) {
    log::info!("rejecting {}: {}", addr, reason);
    let packet = Packet::new(
        PacketHeader::new(0, u32::MAX, 0),
        None,
        Message::JoinRejected {
            reason: reason.to_string(),
        },
    );
    send_packet(transport, addr, &packet);
}
