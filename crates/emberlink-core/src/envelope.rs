use serde::{Deserialize, Serialize};

/// Maximum accepted frame size in bytes. File transfers are chunked by
/// the sender, so a single frame never needs more than this.
pub const MAX_FRAME_SIZE: usize = 64 * 1024; // 64 KiB

/// Every `type` tag a client may send. Kept in sync with [`Envelope`] so
/// decode errors can distinguish an unknown tag from a malformed body.
const CLIENT_TYPES: [&str; 8] = [
    "init",
    "message",
    "file-start",
    "file-chunk",
    "file-complete",
    "offer",
    "answer",
    "ice-candidate",
];

/// A single client → server message unit.
///
/// The wire form is a JSON object with a required `type` tag. The variant
/// set is closed, so routing is an exhaustive match rather than a string
/// dispatch with a default case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Bind this connection into a room. Normally the first frame on a
    /// connection; a repeated `init` rebinds it to another room.
    #[serde(rename = "init")]
    Init(InitMsg),
    /// Chat payload, broadcast to every other room member.
    #[serde(rename = "message")]
    Chat(ChatMsg),
    /// Media transfer framing. The relay is a transparent pipe: chunk
    /// contents are never inspected or reassembled server-side.
    #[serde(rename = "file-start")]
    FileStart(FileFrameMsg),
    #[serde(rename = "file-chunk")]
    FileChunk(FileFrameMsg),
    #[serde(rename = "file-complete")]
    FileComplete(FileFrameMsg),
    /// WebRTC signaling, relayed point-to-point to the named target.
    #[serde(rename = "offer")]
    Offer(SignalMsg),
    #[serde(rename = "answer")]
    Answer(SignalMsg),
    #[serde(rename = "ice-candidate")]
    IceCandidate(SignalMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMsg {
    pub room_id: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMsg {
    /// Sender id. Whatever the client puts here is overwritten with the
    /// connection's bound id before relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mediaURL")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Unix milliseconds; assigned by the relay when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFrameMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Target member id within the sender's room.
    pub to: String,
    /// Opaque SDP / ICE payload, forwarded untouched.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Server → client frames. Relayed client envelopes keep their original
/// shape; these cover what the relay itself originates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Reply to a successful `init`: the peer list excluding the joiner.
    #[serde(rename = "init-ack")]
    InitAck(InitAckMsg),
    /// A relayed chat message, sender id and timestamp stamped.
    #[serde(rename = "message")]
    Chat(ChatMsg),
    #[serde(rename = "peer-joined")]
    PeerJoined(PeerMsg),
    #[serde(rename = "peer-left")]
    PeerLeft(PeerMsg),
    /// Sent only to the originating connection, never broadcast.
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitAckMsg {
    pub room_id: String,
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMsg {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

#[derive(Debug)]
pub enum EnvelopeError {
    FrameTooLarge(usize),
    MissingType,
    UnknownType(String),
    Invalid(String),
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameTooLarge(size) => {
                write!(f, "frame too large: {size} bytes (max {MAX_FRAME_SIZE})")
            },
            Self::MissingType => write!(f, "missing message type"),
            Self::UnknownType(t) => write!(f, "unknown message type: {t}"),
            Self::Invalid(e) => write!(f, "invalid envelope: {e}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// Decode a raw text frame into an [`Envelope`].
///
/// On failure the error says whether the `type` tag was absent,
/// unrecognized, or the body malformed, so the relay can reply with the
/// right complaint.
pub fn decode_envelope(raw: &str) -> Result<Envelope, EnvelopeError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(EnvelopeError::FrameTooLarge(raw.len()));
    }
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => Ok(envelope),
        Err(primary) => {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
                return Err(EnvelopeError::Invalid(primary.to_string()));
            };
            match value.get("type").and_then(|t| t.as_str()) {
                None => Err(EnvelopeError::MissingType),
                Some(tag) if !CLIENT_TYPES.contains(&tag) => {
                    Err(EnvelopeError::UnknownType(tag.to_string()))
                },
                Some(_) => Err(EnvelopeError::Invalid(primary.to_string())),
            }
        },
    }
}

/// Encode a server frame to its JSON wire form.
pub fn encode_server(msg: &ServerEnvelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}
