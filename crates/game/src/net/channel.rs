use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use super::protocol::{Message, Packet, PacketHeader, sequence_greater_than};

const MAX_IN_FLIGHT: usize = 256;
const MAX_REORDER: usize = 256;
const MAX_RESENDS_PER_FLUSH: usize = 32;

#[derive(Debug, Clone, Copy)]
struct InFlight {
    sequence: u32,
    sent_at: Instant,
    reliable: Option<u32>,
}

#[derive(Debug, Default)]
struct ReceiveWindow {
    latest: Option<u32>,
    bitfield: u32,
}

impl ReceiveWindow {
    fn record(&mut self, sequence: u32) -> bool {
        let Some(latest) = self.latest else {
            self.latest = Some(sequence);
            return true;
        };

        if sequence == latest {
            return false;
        }

        if sequence_greater_than(sequence, latest) {
            let shift = sequence.wrapping_sub(latest);
            self.bitfield = if shift <= 32 {
                (self.bitfield.checked_shl(shift).unwrap_or(0)) | (1 << (shift - 1))
            } else {
                0
            };
            self.latest = Some(sequence);
            return true;
        }

        let age = latest.wrapping_sub(sequence);
        if age > 32 {
            return false;
        }
        let bit = 1 << (age - 1);
        if self.bitfield & bit != 0 {
            return false;
        }
        self.bitfield |= bit;
        true
    }

    fn ack_data(&self) -> (u32, u32) {
        match self.latest {
            Some(latest) => (latest, self.bitfield),
            None => (u32::MAX, 0),
        }
    }
}

#[derive(Debug)]
struct OutgoingReliable {
    message: Message,
    last_sent: Option<Instant>,
}

/// Per-peer sequencing on top of an unreliable datagram socket.
#[derive(Debug)]
pub struct Channel {
    send_sequence: u32,
    in_flight: VecDeque<InFlight>,
    received: ReceiveWindow,
    ack_owed: bool,
    last_write: Option<Instant>,
    srtt_ms: f32,
    rtt_var_ms: f32,

    next_reliable: u32,
    unacked: BTreeMap<u32, OutgoingReliable>,

    next_expected: u32,
    reorder: BTreeMap<u32, Message>,
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel {
    pub fn new() -> Self {
        Self {
            send_sequence: 0,
            in_flight: VecDeque::with_capacity(MAX_IN_FLIGHT),
            received: ReceiveWindow::default(),
            ack_owed: false,
            last_write: None,
            srtt_ms: 100.0,
            rtt_var_ms: 50.0,
            next_reliable: 0,
            unacked: BTreeMap::new(),
            next_expected: 0,
            reorder: BTreeMap::new(),
        }
    }

    pub fn queue_reliable(&mut self, message: Message) -> u32 {
        let sequence = self.next_reliable;
        self.next_reliable = self.next_reliable.wrapping_add(1);
        self.unacked.insert(
            sequence,
            OutgoingReliable {
                message,
                last_sent: None,
            },
        );
        sequence
    }

    pub fn write_unreliable(&mut self, message: Message, now: Instant) -> Packet {
        let header = self.next_header(None, now);
        Packet::new(header, None, message)
    }

    pub fn collect_due(&mut self, now: Instant, resend_interval: Duration) -> Vec<Packet> {
        let due: Vec<u32> = self
            .unacked
            .iter()
            .filter(|(_, out)| {
                out.last_sent
                    .is_none_or(|sent| now.duration_since(sent) >= resend_interval)
            })
            .map(|(&seq, _)| seq)
            .take(MAX_RESENDS_PER_FLUSH)
            .collect();

        let mut packets = Vec::with_capacity(due.len());
        for reliable in due {
            let header = self.next_header(Some(reliable), now);
            if let Some(out) = self.unacked.get_mut(&reliable) {
                out.last_sent = Some(now);
                packets.push(Packet::new(header, Some(reliable), out.message.clone()));
            }
        }
        packets
    }

    fn next_header(&mut self, reliable: Option<u32>, now: Instant) -> PacketHeader {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);

        while self.in_flight.len() >= MAX_IN_FLIGHT {
            self.in_flight.pop_front();
        }
        self.in_flight.push_back(InFlight {
            sequence,
            sent_at: now,
            reliable,
        });

        let (ack, ack_bitfield) = self.received.ack_data();
        self.ack_owed = false;
        self.last_write = Some(now);
        PacketHeader::new(sequence, ack, ack_bitfield)
    }

    pub fn receive(&mut self, packet: Packet, now: Instant) -> Vec<Message> {
        // No room to buffer it; leave it unacked so it gets resent.
        if packet.reliable.is_some_and(|reliable| {
            sequence_greater_than(reliable, self.next_expected)
                && self.reorder.len() >= MAX_REORDER
                && !self.reorder.contains_key(&reliable)
        }) {
            return Vec::new();
        }
        if !self.received.record(packet.header.sequence) {
            return Vec::new();
        }
        self.process_ack(packet.header.ack, packet.header.ack_bitfield, now);

        let Some(reliable) = packet.reliable else {
            return vec![packet.message];
        };
        self.ack_owed = true;

        if reliable == self.next_expected {
            let mut ready = vec![packet.message];
            self.next_expected = self.next_expected.wrapping_add(1);
            while let Some(next) = self.reorder.remove(&self.next_expected) {
                ready.push(next);
                self.next_expected = self.next_expected.wrapping_add(1);
            }
            ready
        } else {
            if sequence_greater_than(reliable, self.next_expected) {
                self.reorder.entry(reliable).or_insert(packet.message);
            }
            Vec::new()
        }
    }

    fn process_ack(&mut self, ack: u32, ack_bitfield: u32, now: Instant) {
        let mut samples = Vec::new();

        self.in_flight.retain(|sent| {
            let acked = if sent.sequence == ack {
                true
            } else if sequence_greater_than(ack, sent.sequence) {
                let age = ack.wrapping_sub(sent.sequence);
                age <= 32 && ack_bitfield & (1 << (age - 1)) != 0
            } else {
                false
            };

            if acked {
                samples.push((sent.reliable, now.duration_since(sent.sent_at)));
            }
            !acked
        });

        for (reliable, rtt) in samples {
            if let Some(seq) = reliable {
                self.unacked.remove(&seq);
            }
            self.update_rtt(rtt.as_secs_f32() * 1000.0);
        }
    }

    fn update_rtt(&mut self, rtt_ms: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt_ms - self.srtt_ms).abs();
        self.rtt_var_ms = (1.0 - BETA) * self.rtt_var_ms + BETA * diff;
        self.srtt_ms = (1.0 - ALPHA) * self.srtt_ms + ALPHA * rtt_ms;
    }

    pub fn ack_owed(&self) -> bool {
        self.ack_owed
    }

    pub fn is_idle(&self, now: Instant, interval: Duration) -> bool {
        self.last_write
            .is_none_or(|written| now.duration_since(written) >= interval)
    }

    pub fn pending_reliable(&self) -> usize {
        self.unacked.len()
    }

    pub fn srtt_ms(&self) -> f32 {
        self.srtt_ms
    }

    pub fn rtt_var_ms(&self) -> f32 {
        self.rtt_var_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESEND: Duration = Duration::from_millis(100);

    fn chat(text: &str) -> Message {
        Message::ChatMessage {
            from: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_receive_window_bitfield() {
        let mut window = ReceiveWindow::default();
        assert!(window.record(1));
        assert!(window.record(2));
        assert!(window.record(3));

        let (ack, bitfield) = window.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield & 0b11, 0b11);
    }

    #[test]
    fn test_receive_window_out_of_order_and_duplicates() {
        let mut window = ReceiveWindow::default();
        assert!(window.record(3));
        assert!(window.record(1));
        assert!(window.record(2));
        assert!(!window.record(2));
        assert!(!window.record(3));

        let (ack, bitfield) = window.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield & 0b11, 0b11);
    }

    #[test]
    fn test_unreliable_delivered_immediately() {
        let now = Instant::now();
        let mut sender = Channel::new();
        let mut receiver = Channel::new();

        let packet = sender.write_unreliable(Message::Heartbeat, now);
        assert_eq!(receiver.receive(packet.clone(), now), vec![Message::Heartbeat]);
        assert!(receiver.receive(packet, now).is_empty());
        assert!(!receiver.ack_owed());
    }

    #[test]
    fn test_reliable_resent_until_acked() {
        let start = Instant::now();
        let mut sender = Channel::new();
        let mut receiver = Channel::new();

        sender.queue_reliable(chat("hello"));
        let first = sender.collect_due(start, RESEND);
        assert_eq!(first.len(), 1);

        // Dropped in transit; nothing is due until the interval elapses.
        assert!(sender.collect_due(start + Duration::from_millis(10), RESEND).is_empty());

        let retry = sender.collect_due(start + RESEND, RESEND);
        assert_eq!(retry.len(), 1);
        assert_ne!(retry[0].header.sequence, first[0].header.sequence);

        let delivered = receiver.receive(retry[0].clone(), start + RESEND);
        assert_eq!(delivered, vec![chat("hello")]);
        assert!(receiver.ack_owed());

        let ack = receiver.write_unreliable(Message::Heartbeat, start + RESEND);
        sender.receive(ack, start + RESEND);
        assert_eq!(sender.pending_reliable(), 0);
        assert!(sender.collect_due(start + RESEND * 5, RESEND).is_empty());
    }

    #[test]
    fn test_reliable_delivered_in_order() {
        let now = Instant::now();
        let mut sender = Channel::new();
        let mut receiver = Channel::new();

        for text in ["a", "b", "c"] {
            sender.queue_reliable(chat(text));
        }
        let packets = sender.collect_due(now, RESEND);
        assert_eq!(packets.len(), 3);

        assert!(receiver.receive(packets[2].clone(), now).is_empty());
        assert!(receiver.receive(packets[1].clone(), now).is_empty());
        assert_eq!(
            receiver.receive(packets[0].clone(), now),
            vec![chat("a"), chat("b"), chat("c")]
        );
    }

    #[test]
    fn test_resent_copy_not_delivered_twice() {
        let start = Instant::now();
        let mut sender = Channel::new();
        let mut receiver = Channel::new();

        sender.queue_reliable(chat("once"));
        let first = sender.collect_due(start, RESEND);
        let second = sender.collect_due(start + RESEND, RESEND);

        assert_eq!(receiver.receive(first[0].clone(), start).len(), 1);
        assert!(receiver.receive(second[0].clone(), start + RESEND).is_empty());
    }

    #[test]
    fn test_reliable_past_reorder_window_left_unacked() {
        let now = Instant::now();
        let mut receiver = Channel::new();
        let reliable = |datagram: u32, stream: u32| {
            Packet::new(
                PacketHeader::new(datagram, u32::MAX, 0),
                Some(stream),
                chat(&stream.to_string()),
            )
        };

        for stream in 1..=MAX_REORDER as u32 {
            assert!(receiver.receive(reliable(stream, stream), now).is_empty());
        }
        let overflow = MAX_REORDER as u32 + 1;
        assert!(receiver.receive(reliable(overflow, overflow), now).is_empty());
        assert_eq!(receiver.received.ack_data().0, MAX_REORDER as u32);

        let released = receiver.receive(reliable(1000, 0), now);
        assert_eq!(released.len(), MAX_REORDER + 1);

        let resent = receiver.receive(reliable(1001, overflow), now);
        assert_eq!(resent, vec![chat(&overflow.to_string())]);
    }

    #[test]
    fn test_idle_after_interval_without_writes() {
        let start = Instant::now();
        let mut channel = Channel::new();
        assert!(channel.is_idle(start, RESEND));

        channel.write_unreliable(Message::Heartbeat, start);
        assert!(!channel.is_idle(start + RESEND / 2, RESEND));
        assert!(channel.is_idle(start + RESEND, RESEND));
    }
}
