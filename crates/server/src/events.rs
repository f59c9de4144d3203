use arena::Identity;
use arena::net::DisconnectReason;

/// Things worth showing to whoever runs the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    PlayerJoined { identity: Identity, nickname: String },
    PlayerLeft { identity: Identity, reason: DisconnectReason },
    JoinRejected { identity: Identity, reason: String },
    PlayerDied { victim: Identity, killer: Option<Identity> },
    Chat { identity: Identity, text: String },
    RoundEnded,
    Error { message: String },
}

impl ServerEvent {
    pub fn is_warning(&self) -> bool {
        matches!(self, ServerEvent::JoinRejected { .. } | ServerEvent::Error { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            ServerEvent::PlayerJoined { identity, nickname } => {
                format!("{} joined as '{}'", identity, nickname)
            }
            ServerEvent::PlayerLeft { identity, reason } => {
                format!("{} left ({})", identity, reason.as_str())
            }
            ServerEvent::JoinRejected { identity, reason } => {
                format!("rejected {}: {}", identity, reason)
            }
            ServerEvent::PlayerDied { victim, killer: Some(killer) } => {
                format!("{} destroyed {}", killer, victim)
            }
            ServerEvent::PlayerDied { victim, killer: None } => format!("{} was destroyed", victim),
            ServerEvent::Chat { identity, text } => format!("<{}> {}", identity, text),
            ServerEvent::RoundEnded => "round ended".to_string(),
            ServerEvent::Error { message } => message.clone(),
        }
    }
}
