use std::time::Duration;

use bytes::Bytes;

use emberlink_core::envelope::{
    ChatMsg, Envelope, ErrorMsg, InitAckMsg, InitMsg, PeerMsg, ServerEnvelope, SignalMsg,
    decode_envelope, encode_server,
};
use emberlink_core::time::unix_millis_now;

use crate::rate_limit::FixedWindowLimiter;
use crate::room_manager::ClientLink;
use crate::state::AppState;

/// The room a connection is currently bound into. At most one per
/// connection; envelopes before a successful `init` cannot relay.
struct Binding {
    room_code: String,
    client_id: String,
}

/// Per-connection dispatcher: counts the rate limit, decodes inbound
/// frames, and routes each envelope kind to broadcast or point-to-point
/// relay. Error replies go to this connection only.
pub struct MessageRouter {
    state: AppState,
    link: ClientLink,
    limiter: FixedWindowLimiter,
    binding: Option<Binding>,
}

impl MessageRouter {
    pub fn new(state: AppState, link: ClientLink) -> Self {
        let limiter = FixedWindowLimiter::new(
            state.config.limits.rate_limit_max,
            Duration::from_secs(state.config.limits.rate_limit_window_secs),
        );
        Self {
            state,
            link,
            limiter,
            binding: None,
        }
    }

    /// Process one inbound text frame.
    pub async fn handle_frame(&mut self, raw: &str) {
        if !self.limiter.check() {
            tracing::warn!(
                client_id = self.binding.as_ref().map(|b| b.client_id.as_str()),
                "Rate limited"
            );
            self.reply_error("rate limit exceeded");
            return;
        }

        match decode_envelope(raw) {
            Ok(Envelope::Init(init)) => self.handle_init(init).await,
            Ok(Envelope::Chat(chat)) => self.handle_chat(chat).await,
            Ok(
                Envelope::FileStart(_) | Envelope::FileChunk(_) | Envelope::FileComplete(_),
            ) => self.relay_file_frame(raw).await,
            Ok(Envelope::Offer(sig) | Envelope::Answer(sig) | Envelope::IceCandidate(sig)) => {
                self.relay_signal(raw, &sig).await;
            },
            Err(e) => self.reply_error(&e.to_string()),
        }
    }

    /// The connection is gone: unbind and tell the remaining members.
    pub async fn handle_disconnect(&mut self) {
        self.leave_current_room().await;
    }

    async fn handle_init(&mut self, init: InitMsg) {
        // A repeated init rebinds the connection, so drop any existing
        // membership first.
        self.leave_current_room().await;

        let mut rooms = self.state.rooms.write().await;
        match rooms.join(&init.room_id, &init.client_id, Some(self.link.clone())) {
            Ok(peers) => {
                let joined = ServerEnvelope::PeerJoined(PeerMsg {
                    client_id: init.client_id.clone(),
                });
                if let Ok(json) = encode_server(&joined) {
                    let _ = rooms.broadcast(&init.room_id, Bytes::from(json), Some(&init.client_id));
                }
                drop(rooms);

                tracing::info!(client_id = %init.client_id, room = %init.room_id, "Client joined");
                self.binding = Some(Binding {
                    room_code: init.room_id.clone(),
                    client_id: init.client_id,
                });
                self.reply(&ServerEnvelope::InitAck(InitAckMsg {
                    room_id: init.room_id,
                    peers,
                }));
            },
            Err(e) => {
                drop(rooms);
                self.reply_error(&e.to_string());
            },
        }
    }

    async fn handle_chat(&mut self, mut chat: ChatMsg) {
        let Some(binding) = self.binding.as_ref() else {
            self.reply_error("not in a room");
            return;
        };

        // Sender identity comes from the binding, never from the payload.
        chat.client_id = Some(binding.client_id.clone());
        if chat.timestamp.is_none() {
            chat.timestamp = Some(unix_millis_now());
        }

        let Ok(json) = encode_server(&ServerEnvelope::Chat(chat)) else {
            tracing::warn!("Failed to encode chat frame");
            return;
        };
        let result = {
            let mut rooms = self.state.rooms.write().await;
            rooms.broadcast(&binding.room_code, Bytes::from(json), Some(&binding.client_id))
        };
        if let Err(e) = result {
            self.reply_error(&e.to_string());
        }
    }

    /// Media transfer framing is a transparent pipe: the raw frame goes
    /// out verbatim, contents uninspected.
    async fn relay_file_frame(&mut self, raw: &str) {
        let Some(binding) = self.binding.as_ref() else {
            self.reply_error("not in a room");
            return;
        };
        let frame = Bytes::copy_from_slice(raw.as_bytes());
        let result = {
            let mut rooms = self.state.rooms.write().await;
            rooms.broadcast(&binding.room_code, frame, Some(&binding.client_id))
        };
        if let Err(e) = result {
            self.reply_error(&e.to_string());
        }
    }

    async fn relay_signal(&mut self, raw: &str, sig: &SignalMsg) {
        let Some(binding) = self.binding.as_ref() else {
            self.reply_error("not in a room");
            return;
        };
        let frame = Bytes::copy_from_slice(raw.as_bytes());
        let result = {
            let mut rooms = self.state.rooms.write().await;
            rooms.relay_direct(&binding.room_code, &sig.to, frame)
        };
        if let Err(e) = result {
            self.reply_error(&e.to_string());
        }
    }

    async fn leave_current_room(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        let mut rooms = self.state.rooms.write().await;
        let destroyed = rooms.leave(&binding.room_code, &binding.client_id);
        if !destroyed
            && let Ok(json) = encode_server(&ServerEnvelope::PeerLeft(PeerMsg {
                client_id: binding.client_id.clone(),
            }))
        {
            // The leaver is already out of the member map, so no exclude
            // is needed.
            let _ = rooms.broadcast(&binding.room_code, Bytes::from(json), None);
        }
        drop(rooms);
        tracing::info!(
            client_id = %binding.client_id,
            room = %binding.room_code,
            "Client left"
        );
    }

    fn reply(&self, msg: &ServerEnvelope) {
        let Ok(json) = encode_server(msg) else {
            tracing::warn!("Failed to encode server frame");
            return;
        };
        if let Err(e) = self.link.sender.try_send(Bytes::from(json)) {
            tracing::debug!(error = %e, "Failed to send reply (connection gone)");
        }
    }

    fn reply_error(&self, message: &str) {
        self.reply(&ServerEnvelope::Error(ErrorMsg {
            message: message.to_string(),
        }));
    }
}
