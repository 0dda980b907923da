//! `killmails:lobby` WebSocket channel (spec §6 "Downstream — WebSocket
//! channel"): join params `{systems?, characters?}`, four subscribe/
//! unsubscribe control messages plus `get_status`, server pushes
//! `killmail_update` filtered by the union of the session's system and
//! character sets.
//!
//! Grounded in the teacher's `ws_forwarder.rs` session-loop shape
//! (`tokio::select!` between socket reads and a broadcast receiver), generalized
//! from one fixed stream subscription to a client-mutable filter set.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wk_subscriptions::{payload::ALL_SYSTEMS_TOPIC, DeliveryPayload};
use wk_types::subscription::{MAX_CHARACTER_IDS, MAX_SYSTEM_IDS};

use crate::state::GatewayState;

#[derive(Debug, Deserialize, Default)]
pub struct LobbyJoinParams {
    #[serde(default)]
    pub systems: Vec<u32>,
    #[serde(default)]
    pub characters: Vec<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SubscribeSystems { systems: Vec<u32> },
    UnsubscribeSystems { systems: Vec<u32> },
    SubscribeCharacters { characters: Vec<u64> },
    UnsubscribeCharacters { characters: Vec<u64> },
    GetStatus,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    KillmailUpdate { killmails: &'a [wk_types::Killmail] },
    Status { systems: Vec<u32>, characters: Vec<u64> },
    Error { message: String },
}

struct LobbyFilter {
    systems: HashSet<u32>,
    characters: HashSet<u64>,
}

impl LobbyFilter {
    fn new(params: LobbyJoinParams) -> Self {
        Self {
            systems: params.systems.into_iter().collect(),
            characters: params.characters.into_iter().collect(),
        }
    }

    fn matches(&self, killmail: &wk_types::Killmail) -> bool {
        if self.systems.contains(&killmail.system_id) {
            return true;
        }
        if self.characters.is_empty() {
            return false;
        }
        if killmail.victim.character_id.is_some_and(|id| self.characters.contains(&id)) {
            return true;
        }
        killmail
            .attackers
            .iter()
            .any(|a| a.character_id.is_some_and(|id| self.characters.contains(&id)))
    }
}

pub async fn lobby_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(params): Query<LobbyJoinParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state, params))
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage<'_>) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn handle_lobby_socket(mut socket: WebSocket, state: GatewayState, params: LobbyJoinParams) {
    if params.systems.len() > MAX_SYSTEM_IDS || params.characters.len() > MAX_CHARACTER_IDS {
        let _ = send(
            &mut socket,
            &ServerMessage::Error {
                message: "systems/characters exceed the allowed bounds".to_owned(),
            },
        )
        .await;
        return;
    }

    let mut filter = LobbyFilter::new(params);
    let mut rx = state.subscriptions.broadcaster().subscribe(ALL_SYSTEMS_TOPIC);
    info!("lobby.connected");

    loop {
        tokio::select! {
            biased;
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&mut socket, &mut filter, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("lobby.disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "lobby.ws_error");
                        break;
                    }
                }
            }
            broadcast = rx.recv() => {
                match broadcast {
                    Ok(DeliveryPayload::KillmailUpdate { kills, .. }) => {
                        let matching: Vec<wk_types::Killmail> = kills.into_iter().filter(|k| filter.matches(k)).collect();
                        if !matching.is_empty() && !send(&mut socket, &ServerMessage::KillmailUpdate { killmails: &matching }).await {
                            break;
                        }
                    }
                    Ok(DeliveryPayload::KillmailCountUpdate { .. }) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lobby.lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Returns `false` when the session should close.
async fn handle_client_message(socket: &mut WebSocket, filter: &mut LobbyFilter, text: &str) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return send(
                socket,
                &ServerMessage::Error {
                    message: format!("invalid message: {e}"),
                },
            )
            .await;
        }
    };

    match message {
        ClientMessage::SubscribeSystems { systems } => filter.systems.extend(systems),
        ClientMessage::UnsubscribeSystems { systems } => {
            for s in systems {
                filter.systems.remove(&s);
            }
        }
        ClientMessage::SubscribeCharacters { characters } => filter.characters.extend(characters),
        ClientMessage::UnsubscribeCharacters { characters } => {
            for c in characters {
                filter.characters.remove(&c);
            }
        }
        ClientMessage::GetStatus => {
            return send(
                socket,
                &ServerMessage::Status {
                    systems: filter.systems.iter().copied().collect(),
                    characters: filter.characters.iter().copied().collect(),
                },
            )
            .await;
        }
    }
    true
}
