//! Per-client connection handler.
//!
//! Each accepted connection gets one task running the framed
//! read/dispatch loop plus a writer task draining this client's
//! outbound channel. Before login only `register` and `login` do
//! anything; every other action is silently ignored until a session
//! exists. Cleanup always unregisters the session, however the loop
//! ended.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::frame;
use crate::proto::{AuthReply, Push, Request, normalize_group, normalize_room};
use crate::routing;
use crate::server::SharedState;
use crate::store::{FriendRequestOutcome, RegisterOutcome};

/// Handle one accepted TCP connection end-to-end.
pub async fn handle(stream: TcpStream, state: Arc<SharedState>) -> Result<()> {
    let peer = stream.peer_addr()?;
    tracing::info!(%peer, "new connection");
    let (reader, writer) = tokio::io::split(stream);
    handle_io(BufReader::new(reader), writer, state).await
}

async fn handle_io<R, W>(mut reader: BufReader<R>, writer: W, state: Arc<SharedState>) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Frames pushed to this client, both by its own handler and by
    // other connections fanning out through the session directory.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);

    let mut write_half = writer;
    let write_handle = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    let mut current_user: Option<String> = None;

    loop {
        let Some(value) = frame::read_value(&mut reader).await else {
            break;
        };
        let Some(mut req) = Request::from_value(value) else {
            tracing::debug!("skipping undecodable request");
            continue;
        };
        req.trim();

        match req {
            Request::Register { username, password } => {
                let reply = register_reply(&state, &username, &password);
                let _ = tx.send(frame::encode(&reply)).await;
            }
            Request::Login { username, password } => {
                let ok = state
                    .with_store(|s| s.check_login(&username, &password))
                    .unwrap_or(false);
                if ok {
                    // Last login wins: a prior session under this name
                    // is evicted from the directory without notice.
                    state.directory.register(&username, tx.clone());
                    tracing::info!(user = %username, "login");
                    current_user = Some(username);
                    let reply = AuthReply::success(state.crypto.key_string());
                    let _ = tx.send(frame::encode(&reply)).await;
                } else {
                    let reply = AuthReply::error("Invalid credentials");
                    let _ = tx.send(frame::encode(&reply)).await;
                }
            }
            Request::GetData => {
                if let Some(ref user) = current_user {
                    push_data_update(&state, user).await;
                }
            }
            Request::GetHistory { target } => {
                if let Some(ref user) = current_user {
                    let messages = state
                        .with_store(|s| s.chat_history(user, &target))
                        .unwrap_or_default();
                    let push = Push::HistoryResponse { target, messages };
                    let _ = tx.send(frame::encode(&push)).await;
                }
            }
            Request::Msg { to, text } => {
                if let Some(ref user) = current_user {
                    routing::route_message(&state, user, &to, &text).await;
                }
            }
            Request::SendFriendRequest { target } => {
                if let Some(ref user) = current_user {
                    let outcome = state.with_store(|s| s.send_friend_request(user, &target));
                    if outcome == Some(FriendRequestOutcome::Success) {
                        push_data_update(&state, &target).await;
                        push_data_update(&state, user).await;
                    }
                }
            }
            Request::HandleRequest { sender, decision } => {
                if let Some(ref user) = current_user {
                    state.with_store(|s| s.handle_request(&sender, user, decision));
                    push_data_update(&state, user).await;
                    push_data_update(&state, &sender).await;
                }
            }
            Request::CreateGroup { group_name } => {
                if let Some(ref user) = current_user {
                    let name = normalize_group(&group_name);
                    let created = state
                        .with_store(|s| s.create_group(&name, user))
                        .unwrap_or(false);
                    if created {
                        tracing::info!(user = %user, group = %name, "group created");
                        push_data_update(&state, user).await;
                    }
                }
            }
            Request::JoinGroup { group_name } => {
                if let Some(ref user) = current_user {
                    let name = normalize_group(&group_name);
                    let joined = state
                        .with_store(|s| s.join_group(&name, user))
                        .unwrap_or(false);
                    if joined {
                        push_data_update(&state, user).await;
                    }
                }
            }
            Request::CreatePublicRoom { room_name, tags } => {
                if let Some(ref user) = current_user {
                    let name = normalize_room(&room_name);
                    let created = state
                        .with_store(|s| s.create_public_room(&name, &tags, user))
                        .unwrap_or(false);
                    if created {
                        tracing::info!(user = %user, room = %name, "public room created");
                        push_data_update(&state, user).await;
                    }
                }
            }
        }
    }

    if let Some(ref user) = current_user {
        state.directory.unregister(user);
        tracing::info!(user = %user, "session closed");
    }
    write_handle.abort();
    Ok(())
}

fn register_reply(state: &Arc<SharedState>, username: &str, password: &str) -> AuthReply {
    if username.is_empty() || password.is_empty() {
        return AuthReply::error("Username and password cannot be empty!");
    }
    match state.with_store(|s| s.register_user(username, password)) {
        Some(RegisterOutcome::Success) => {
            tracing::info!(user = %username, "registered");
            AuthReply::success(state.crypto.key_string())
        }
        Some(RegisterOutcome::Taken) => AuthReply::error("Username taken!"),
        None => AuthReply::error("Error."),
    }
}

/// Compile and push the full roster snapshot to one user, if online.
pub async fn push_data_update(state: &Arc<SharedState>, username: &str) {
    let Some(tx) = state.directory.lookup(username) else {
        return;
    };
    let friends = state
        .with_store(|s| s.friends_of(username))
        .unwrap_or_default();
    let groups = state
        .with_store(|s| s.user_groups(username))
        .unwrap_or_default();
    let requests = state
        .with_store(|s| s.pending_requests(username))
        .unwrap_or_default();
    let public_rooms = state.with_store(|s| s.public_rooms()).unwrap_or_default();
    let active_users = state.directory.all_usernames();

    let push = Push::DataUpdate {
        friends,
        groups,
        requests,
        active_users,
        public_rooms,
    };
    if tx.send(frame::encode(&push)).await.is_err() {
        tracing::warn!(user = %username, "data_update push failed");
    }
}
