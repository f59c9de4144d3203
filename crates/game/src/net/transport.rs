use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use super::protocol::MAX_PACKET_SIZE;
use super::stats::{Counters, NetworkStats};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: SocketAddr,
    pub payload: Vec<u8>,
}

/// UDP socket driven by a small tokio runtime.
pub struct Transport {
    local_addr: SocketAddr,
    inbound: mpsc::Receiver<Datagram>,
    outbound: mpsc::Sender<Datagram>,
    counters: Arc<Counters>,
    runtime: Option<Runtime>,
}

impl Transport {
    pub fn bind(addr: SocketAddr, queue_capacity: usize) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("arena-net")
            .enable_io()
            .build()?;

        let socket = runtime.block_on(UdpSocket::bind(addr))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let counters = Arc::new(Counters::default());

        let capacity = queue_capacity.max(1);
        let (inbound_tx, inbound) = mpsc::channel(capacity);
        let (outbound, outbound_rx) = mpsc::channel(capacity);

        runtime.spawn(receive_loop(socket.clone(), inbound_tx, counters.clone()));
        runtime.spawn(send_loop(socket, outbound_rx, counters.clone()));

        log::debug!("transport bound to {}", local_addr);

        Ok(Self {
            local_addr,
            inbound,
            outbound,
            counters,
            runtime: Some(runtime),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn try_recv(&mut self) -> Option<Datagram> {
        match self.inbound.try_recv() {
            Ok(datagram) => Some(datagram),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn try_send(&self, addr: SocketAddr, payload: Vec<u8>) -> bool {
        if payload.len() > MAX_PACKET_SIZE {
            log::warn!("dropping {} byte datagram to {}", payload.len(), addr);
            self.counters.record_dropped_outbound();
            return false;
        }

        match self.outbound.try_send(Datagram { addr, payload }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.counters.record_dropped_outbound();
                false
            }
        }
    }

    pub fn stats(&self) -> NetworkStats {
        self.counters.snapshot()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<Datagram>, counters: Arc<Counters>) {
    // One spare byte so oversized datagrams are detectable.
    let mut buffer = vec![0u8; MAX_PACKET_SIZE + 1];

    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, addr)) => {
                counters.record_received(len);
                if len > MAX_PACKET_SIZE {
                    log::debug!("oversized datagram from {}", addr);
                    continue;
                }

                let datagram = Datagram {
                    addr,
                    payload: buffer[..len].to_vec(),
                };
                match tx.try_send(datagram) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => counters.record_dropped_inbound(),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Err(e) => {
                if tx.is_closed() {
                    break;
                }
                log::debug!("recv error: {}", e);
            }
        }
    }
}

async fn send_loop(socket: Arc<UdpSocket>, mut rx: mpsc::Receiver<Datagram>, counters: Arc<Counters>) {
    while let Some(datagram) = rx.recv().await {
        match socket.send_to(&datagram.payload, datagram.addr).await {
            Ok(sent) => counters.record_sent(sent),
            Err(e) => log::debug!("send to {} failed: {}", datagram.addr, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn wait_for(transport: &mut Transport, timeout: Duration) -> Option<Datagram> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(datagram) = transport.try_recv() {
                return Some(datagram);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_datagram_roundtrip_over_loopback() {
        let mut a = Transport::bind(loopback(), 16).unwrap();
        let mut b = Transport::bind(loopback(), 16).unwrap();

        assert!(a.try_send(b.local_addr(), vec![1, 2, 3]));
        let received = wait_for(&mut b, Duration::from_secs(2)).expect("no datagram");

        assert_eq!(received.payload, vec![1, 2, 3]);
        assert_eq!(received.addr, a.local_addr());
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_oversized_send_dropped() {
        let a = Transport::bind(loopback(), 4).unwrap();
        let target = a.local_addr();

        assert!(!a.try_send(target, vec![0; MAX_PACKET_SIZE + 1]));
        assert_eq!(a.stats().dropped_outbound, 1);
    }
}
