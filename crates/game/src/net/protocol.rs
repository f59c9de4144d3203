use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::physics::VehicleKind;
use crate::pickup::PickupKind;
use crate::player::Team;
use crate::snapshot::VehicleSnapshot;

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4152_4E41;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_BROADCAST_RATE: u32 = 20;
pub const MAX_NICKNAME_LEN: usize = 24;
pub const MAX_CHAT_LEN: usize = 200;
/// Keeps one snapshot batch datagram under `MAX_PACKET_SIZE`.
pub const MAX_SNAPSHOTS_PER_BATCH: usize = 12;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Unreliable,
    ReliableOrdered,
}

impl Reliability {
    pub fn is_reliable(&self) -> bool {
        matches!(self, Reliability::ReliableOrdered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "quit",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct SnapshotEntry {
    pub player: u32,
    pub snapshot: VehicleSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ScoreEntry {
    pub player: u32,
    pub round_score: u32,
    pub game_score: u32,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Message {
    Join {
        nickname: String,
        password: Option<String>,
    },
    Quit,
    TeamSelect {
        team: Team,
    },
    SpawnRequest {
        vehicle: VehicleKind,
    },
    PlayerInput {
        tick: u32,
        input: u8,
    },
    VehicleSnapshotBatch {
        tick: u32,
        entries: Vec<SnapshotEntry>,
    },
    PickupSpawn {
        pickup: u32,
        kind: PickupKind,
        position: [f32; 3],
    },
    PickupCollect {
        pickup: u32,
        collector: u32,
    },
    ChatMessage {
        from: Option<u32>,
        text: String,
    },
    ScoreSync {
        scores: Vec<ScoreEntry>,
    },
    JoinAccepted {
        player: u32,
        tick_rate: u32,
        broadcast_rate: u32,
    },
    JoinRejected {
        reason: String,
    },
    PlayerJoined {
        player: u32,
        nickname: String,
        team: Team,
    },
    PlayerLeft {
        player: u32,
        reason: DisconnectReason,
    },
    TeamChanged {
        player: u32,
        team: Team,
    },
    VipDeclared {
        team: Team,
        player: u32,
    },
    PlayerSpawned {
        player: u32,
        vehicle: VehicleKind,
        state: VehicleSnapshot,
    },
    PlayerDied {
        player: u32,
        killer: Option<u32>,
    },
    Heartbeat,
}

impl Message {
    pub fn reliability(&self) -> Reliability {
        match self {
            Message::PlayerInput { .. } | Message::VehicleSnapshotBatch { .. } | Message::Heartbeat => {
                Reliability::Unreliable
            }
            Message::Join { .. }
            | Message::Quit
            | Message::TeamSelect { .. }
            | Message::SpawnRequest { .. }
            | Message::PickupSpawn { .. }
            | Message::PickupCollect { .. }
            | Message::ChatMessage { .. }
            | Message::ScoreSync { .. }
            | Message::JoinAccepted { .. }
            | Message::JoinRejected { .. }
            | Message::PlayerJoined { .. }
            | Message::PlayerLeft { .. }
            | Message::TeamChanged { .. }
            | Message::VipDeclared { .. }
            | Message::PlayerSpawned { .. }
            | Message::PlayerDied { .. } => Reliability::ReliableOrdered,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::Quit => "quit",
            Message::TeamSelect { .. } => "team_select",
            Message::SpawnRequest { .. } => "spawn_request",
            Message::PlayerInput { .. } => "player_input",
            Message::VehicleSnapshotBatch { .. } => "vehicle_snapshot_batch",
            Message::PickupSpawn { .. } => "pickup_spawn",
            Message::PickupCollect { .. } => "pickup_collect",
            Message::ChatMessage { .. } => "chat_message",
            Message::ScoreSync { .. } => "score_sync",
            Message::JoinAccepted { .. } => "join_accepted",
            Message::JoinRejected { .. } => "join_rejected",
            Message::PlayerJoined { .. } => "player_joined",
            Message::PlayerLeft { .. } => "player_left",
            Message::TeamChanged { .. } => "team_changed",
            Message::VipDeclared { .. } => "vip_declared",
            Message::PlayerSpawned { .. } => "player_spawned",
            Message::PlayerDied { .. } => "player_died",
            Message::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub reliable: Option<u32>,
    pub message: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("malformed message: {0}")]
    Deserialize(rancor::Error),
    #[error("bad magic or protocol version")]
    InvalidHeader,
    #[error("datagram of {0} bytes exceeds {MAX_PACKET_SIZE}")]
    TooLarge(usize),
}

impl Packet {
    pub fn new(header: PacketHeader, reliable: Option<u32>, message: Message) -> Self {
        Self {
            header,
            reliable,
            message,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)?;

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(data.len()));
        }

        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let packet = rkyv::from_bytes::<Self, rancor::Error>(&aligned[..])
            .map_err(PacketError::Deserialize)?;

        if !packet.header.is_valid() {
            return Err(PacketError::InvalidHeader);
        }
        Ok(packet)
    }
}
