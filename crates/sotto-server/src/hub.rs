//! Relay hub dispatch workers.
//!
//! Two long-lived workers run for the hub's lifetime:
//!
//! - the **broadcast worker** is the sole owner of the active-session set.
//!   Everything that changes or reads that set arrives over the hub event
//!   channel: new sessions from the accept loop, decrypted messages and
//!   departures from the listeners. No lock, no sharing.
//!
//! - the **assistant worker** drains flagged questions, calls the answering
//!   service one question at a time, and replies to the asking session only.
//!
//! Both queues are FIFO with a configured capacity. Messages are broadcast
//! in enqueue order; there is no ordering guarantee between an assistant
//! reply and concurrent broadcasts.

use std::sync::Arc;

use sotto_core::{
    ANSWER_PREFIX, AnswerService, MessageStore, RelayMessage, is_assistant_question,
};
use sotto_crypto::KeyPair;
use tokio::sync::mpsc;

use crate::{
    history::replay_history,
    session::{Delivery, SessionHandle},
};

/// Everything the broadcast worker reacts to, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    /// A handshake completed; replay history to the session, then make it
    /// live.
    Join(SessionHandle),
    /// A listener decrypted one inbound message.
    Publish {
        /// Session that produced the message; assistant replies go back
        /// here and nowhere else.
        origin_session_id: u64,
        /// The decrypted, display-formatted message.
        message: RelayMessage,
    },
    /// A listener terminated; retire the session without waiting for the
    /// next fan-out write to fail.
    Leave {
        /// Session whose connection is gone.
        session_id: u64,
    },
}

/// One question awaiting the answering service.
#[derive(Debug)]
pub struct AssistantQuestion {
    /// The asking session.
    pub session: SessionHandle,
    /// Full display text of the question (includes the trigger token).
    pub text: String,
}

/// Broadcast worker: single consumer of the hub event channel, sole owner
/// of the active-session set.
///
/// Fan-out is per-session fault isolated: an encryption failure skips that
/// session, a dead outbound channel marks it for removal, and removal
/// happens only after the full pass over the set.
pub async fn run_broadcast_worker(
    mut events: mpsc::Receiver<HubEvent>,
    assistant_tx: mpsc::Sender<AssistantQuestion>,
    hub_key: Arc<KeyPair>,
    messages: Arc<dyn MessageStore>,
    trigger_token: String,
) {
    let mut sessions: Vec<SessionHandle> = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Join(session) => {
                if let Err(e) = replay_history(&*messages, &hub_key, &session).await {
                    tracing::warn!(
                        session_id = session.session_id,
                        "history replay aborted: {e}"
                    );
                }
                tracing::info!(
                    session_id = session.session_id,
                    user = %session.identity.name,
                    active = sessions.len() + 1,
                    "session joined"
                );
                sessions.push(session);
            },
            HubEvent::Publish { origin_session_id, message } => {
                if is_assistant_question(&message.text, &trigger_token) {
                    route_to_assistant(&sessions, origin_session_id, message, &assistant_tx)
                        .await;
                    continue;
                }
                broadcast(&mut sessions, &message);
            },
            HubEvent::Leave { session_id } => {
                sessions.retain(|s| s.session_id != session_id);
                tracing::info!(session_id, active = sessions.len(), "session left");
            },
        }
    }

    tracing::debug!("hub event channel closed, broadcast worker stopping");
}

/// Hand a flagged question to the assistant queue, addressed to its origin
/// session. Never broadcast.
async fn route_to_assistant(
    sessions: &[SessionHandle],
    origin_session_id: u64,
    message: RelayMessage,
    assistant_tx: &mpsc::Sender<AssistantQuestion>,
) {
    let Some(origin) = sessions.iter().find(|s| s.session_id == origin_session_id) else {
        // Asker vanished between publish and dispatch; nobody to answer.
        tracing::warn!(origin_session_id, "dropping assistant question from dead session");
        return;
    };

    let question = AssistantQuestion { session: origin.clone(), text: message.text };
    if assistant_tx.send(question).await.is_err() {
        tracing::error!("assistant worker gone, dropping question");
    }
}

/// One fan-out pass. Dead sessions are collected during the pass and
/// removed after it completes, never mid-iteration.
fn broadcast(sessions: &mut Vec<SessionHandle>, message: &RelayMessage) {
    let mut dead: Vec<u64> = Vec::new();

    for session in sessions.iter() {
        let blocks = match crate::session::seal_text(&session.peer_key, &message.text) {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(
                    session_id = session.session_id,
                    "skipping session, encrypt failed: {e}"
                );
                continue;
            },
        };

        for block in blocks {
            match session.try_deliver(block) {
                Delivery::Queued => {},
                Delivery::Dropped => {
                    tracing::warn!(
                        session_id = session.session_id,
                        "outbound queue full, dropping block for slow session"
                    );
                    break;
                },
                Delivery::Closed => {
                    dead.push(session.session_id);
                    break;
                },
            }
        }
    }

    if !dead.is_empty() {
        sessions.retain(|s| !dead.contains(&s.session_id));
        tracing::info!(removed = dead.len(), active = sessions.len(), "pruned dead sessions");
    }
}

/// Assistant worker: drains the question queue, one question at a time.
///
/// The answering service is awaited to completion before the next question
/// is taken. The reply is prefixed, encrypted under the asker's key only
/// and delivered to the asker only. Service failure drops the question with
/// a log line; there is no retry.
pub async fn run_assistant_worker(
    mut questions: mpsc::Receiver<AssistantQuestion>,
    service: Arc<dyn AnswerService>,
) {
    while let Some(AssistantQuestion { session, text }) = questions.recv().await {
        let answer = match service.ask(&text).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(session_id = session.session_id, "dropping question: {e}");
                continue;
            },
        };

        let reply = format!("{ANSWER_PREFIX}{answer}");
        let blocks = match crate::session::seal_text(&session.peer_key, &reply) {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!(session_id = session.session_id, "reply encrypt failed: {e}");
                continue;
            },
        };

        for block in blocks {
            if session.deliver(block).await.is_err() {
                tracing::debug!(
                    session_id = session.session_id,
                    "asker gone before the answer arrived"
                );
                break;
            }
        }
    }

    tracing::debug!("assistant queue closed, assistant worker stopping");
}
