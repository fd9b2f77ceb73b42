use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::room_manager::ClientLink;
use crate::router::MessageRouter;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.client_message_buffer);
    let shutdown = CancellationToken::new();
    let link = ClientLink {
        sender: tx,
        shutdown: shutdown.clone(),
    };

    spawn_writer(ws_sender, rx);

    let mut router = MessageRouter::new(state, link);

    // The janitor (room expiry) and dead-peer eviction cancel the token;
    // breaking out of the loop drops the writer channel, which ends the
    // writer task and closes the socket for real.
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            next = ws_receiver.next() => {
                let Some(Ok(msg)) = next else { break };
                match msg {
                    Message::Text(text) => router.handle_frame(text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {},
                }
            },
        }
    }

    router.handle_disconnect().await;
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            // Frames are JSON we encoded ourselves, so this only skips
            // if something hands the channel raw non-UTF-8 bytes.
            let Ok(text) = String::from_utf8(data.to_vec()) else {
                continue;
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
}
