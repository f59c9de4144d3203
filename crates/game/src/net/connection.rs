use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::channel::Channel;
use crate::player::Identity;

#[derive(Debug)]
pub struct Peer {
    pub identity: Identity,
    pub addr: SocketAddr,
    pub channel: Channel,
    pub joined: bool,
    pub closing: bool,
    last_receive: Instant,
}

impl Peer {
    fn new(identity: Identity, addr: SocketAddr, now: Instant) -> Self {
        Self {
            identity,
            addr,
            channel: Channel::new(),
            joined: false,
            closing: false,
            last_receive: now,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_receive = now;
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.last_receive) > timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    #[error("server full")]
    Full,
}

#[derive(Debug)]
pub struct PeerTable {
    by_addr: HashMap<SocketAddr, Identity>,
    peers: HashMap<Identity, Peer>,
    next_identity: u32,
    max_peers: usize,
    timeout: Duration,
}

impl PeerTable {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            by_addr: HashMap::new(),
            peers: HashMap::new(),
            next_identity: 1,
            max_peers,
            timeout,
        }
    }

    pub fn get_or_insert(&mut self, addr: SocketAddr, now: Instant) -> Result<&mut Peer, PeerError> {
        if let Some(identity) = self.by_addr.get(&addr).copied() {
            return self.peers.get_mut(&identity).ok_or(PeerError::Full);
        }

        if self.peers.len() >= self.max_peers {
            return Err(PeerError::Full);
        }

        let identity = Identity(self.next_identity);
        self.next_identity = self.next_identity.wrapping_add(1).max(1);
        Ok(self.insert(identity, addr, now))
    }

    pub fn insert(&mut self, identity: Identity, addr: SocketAddr, now: Instant) -> &mut Peer {
        if let Some(old) = self.by_addr.insert(addr, identity) {
            self.peers.remove(&old);
        }
        self.peers
            .entry(identity)
            .insert_entry(Peer::new(identity, addr, now))
            .into_mut()
    }

    pub fn identity_of(&self, addr: &SocketAddr) -> Option<Identity> {
        self.by_addr.get(addr).copied()
    }

    pub fn get(&self, identity: Identity) -> Option<&Peer> {
        self.peers.get(&identity)
    }

    pub fn get_mut(&mut self, identity: Identity) -> Option<&mut Peer> {
        self.peers.get_mut(&identity)
    }

    pub fn remove(&mut self, identity: Identity) -> Option<Peer> {
        let peer = self.peers.remove(&identity)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> + '_ {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> + '_ {
        self.peers.values_mut()
    }

    pub fn sweep_timed_out(&mut self, now: Instant) -> Vec<Identity> {
        let mut timed_out: Vec<Identity> = self
            .peers
            .values()
            .filter(|p| p.is_timed_out(now, self.timeout))
            .map(|p| p.identity)
            .collect();
        timed_out.sort();

        for identity in &timed_out {
            self.remove(*identity);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn joined_count(&self) -> usize {
        self.peers.values().filter(|p| p.joined).count()
    }
}
