//! `/chef`: streamed chat completion.
//!
//! The upstream stream is read by a spawned task and forwarded through a bounded
//! channel. When the request names a chat session, the newest user message and
//! the complete reply are appended to the chat log once the stream ends. A
//! client that disconnects stops the task and nothing is logged.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use sous_core::models::{NewChatMessage, PromptMessage, Role};
use sous_core::stream::{TextStream, Utf8Accumulator};
use sous_core::{ChefRequest, SousError, Store};

use crate::auth::authorize;
use crate::http::{error_response, HttpState};

const FORWARD_BUFFER: usize = 16;

pub async fn chef_inner(
    state: &Arc<HttpState>,
    headers: &HeaderMap,
    req: ChefRequest,
) -> Result<Body, (StatusCode, serde_json::Value)> {
    let user_id = authorize(state.store.as_ref(), headers, req.user_id)
        .await
        .map_err(|e| error_response(&e))?;

    if req.messages.is_empty() {
        return Err(error_response(&SousError::InvalidInput(
            "messages are required".to_string(),
        )));
    }

    let mut messages = match &req.session_id {
        Some(session_id) => stored_history(state.store.as_ref(), user_id, session_id)
            .await
            .map_err(|e| error_response(&e))?,
        None => Vec::new(),
    };
    let latest_user = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());
    messages.extend(req.messages);

    let upstream_req = ChefRequest {
        user_id: Some(user_id),
        chat_mode: req.chat_mode,
        messages,
        session_id: req.session_id.clone(),
    };

    let upstream = state
        .chat
        .stream_chat(&upstream_req)
        .await
        .map_err(|e| error_response(&e))?;

    tracing::info!(
        user_id = %user_id,
        mode = ?upstream_req.chat_mode,
        history = upstream_req.messages.len(),
        "Chat stream started"
    );

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(FORWARD_BUFFER);
    let log = req.session_id.map(|session_id| ChatLogTarget {
        store: state.store.clone(),
        user_id,
        session_id,
        user_message: latest_user,
    });
    tokio::spawn(forward(upstream, tx, log));

    Ok(Body::from_stream(rx))
}

/// Stored turns for the session, oldest first. System rows are audit entries
/// and are not replayed to the model.
async fn stored_history(
    store: &dyn Store,
    user_id: Uuid,
    session_id: &str,
) -> Result<Vec<PromptMessage>, SousError> {
    Ok(store
        .list_messages(user_id, session_id)
        .await?
        .into_iter()
        .filter(|m| m.role != Role::System)
        .map(|m| PromptMessage {
            role: m.role,
            content: m.content,
        })
        .collect())
}

struct ChatLogTarget {
    store: Arc<dyn Store>,
    user_id: Uuid,
    session_id: String,
    user_message: Option<String>,
}

async fn forward(
    mut upstream: TextStream,
    mut tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    log: Option<ChatLogTarget>,
) {
    let mut reply = Utf8Accumulator::default();

    while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(bytes) => {
                reply.push(&bytes);
                if tx.send(Ok(bytes)).await.is_err() {
                    tracing::debug!("Client went away mid-stream");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upstream stream failed");
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                return;
            }
        }
    }

    // The body stays open until the turn is logged.
    if let Some(target) = log {
        append_turn(target, reply.finish()).await;
    }
    drop(tx);
}

async fn append_turn(target: ChatLogTarget, reply: String) {
    let ChatLogTarget {
        store,
        user_id,
        session_id,
        user_message,
    } = target;

    let turn = user_message
        .map(|content| (Role::User, content))
        .into_iter()
        .chain(std::iter::once((Role::Assistant, reply)));

    for (role, content) in turn {
        let message = NewChatMessage {
            user_id,
            session_id: session_id.clone(),
            role,
            content,
            recipe_data: None,
        };
        if let Err(e) = store.append_message(message).await {
            tracing::error!(user_id = %user_id, session_id = %session_id, error = %e, "Failed to log chat turn");
            return;
        }
    }
}
