//! WebSocket transport for viewer sessions.
//!
//! One hub session per socket. A writer task drains the session queue into
//! the socket; the read side only watches for the viewer going away.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use super::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut session = state.registry.join_session();
    let id = session.id();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = session.recv().await {
            if sink.send(Message::Text(payload.as_ref().into())).await.is_err() {
                return;
            }
        }
        // Dropped by the hub (slow viewer or shutdown)
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Viewers send nothing meaningful; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    writer.abort();
    state.registry.leave_session(id);
}
