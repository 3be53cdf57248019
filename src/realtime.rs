//! Push subscription for new messages of the open case.
//!
//! The hosted store's inserts are picked up by a short-interval poll running
//! on a spawned task. A [`MessageSubscription`] owns that task; dropping the
//! handle stops it, so replacing or closing the detail view always releases
//! the previous subscription.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::models::Message;

/// Message list of the open case, shared with its subscription task.
pub type MessageBuffer = Arc<Mutex<Vec<Message>>>;

/// Tracks the newest delivered message so a poll does not deliver it twice.
#[derive(Debug, Default, Clone)]
pub struct DeliveryCursor {
    newest: Option<DateTime<Utc>>,
    ids_at_newest: HashSet<String>,
}

impl DeliveryCursor {
    /// Cursor positioned after the given already-known messages.
    pub fn after(messages: &[Message]) -> Self {
        let mut cursor = Self::default();
        cursor.advance(messages);
        cursor
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.newest
    }

    /// Drops rows already delivered and moves the cursor past the rest.
    pub fn take_new(&mut self, rows: Vec<Message>) -> Vec<Message> {
        let fresh: Vec<Message> = rows
            .into_iter()
            .filter(|m| match self.newest {
                None => true,
                Some(newest) if m.created_at > newest => true,
                Some(newest) if m.created_at == newest => !self.ids_at_newest.contains(&m.id),
                Some(_) => false,
            })
            .collect();
        self.advance(&fresh);
        fresh
    }

    fn advance(&mut self, messages: &[Message]) {
        for m in messages {
            match self.newest {
                Some(newest) if m.created_at < newest => {}
                Some(newest) if m.created_at == newest => {
                    self.ids_at_newest.insert(m.id.clone());
                }
                _ => {
                    self.newest = Some(m.created_at);
                    self.ids_at_newest.clear();
                    self.ids_at_newest.insert(m.id.clone());
                }
            }
        }
    }
}

/// Appends pushed messages in arrival order.
pub async fn append_pushed(buffer: &MessageBuffer, pushed: Vec<Message>) {
    if pushed.is_empty() {
        return;
    }
    buffer.lock().await.extend(pushed);
}

/// Live subscription to one case's new messages.
pub struct MessageSubscription {
    case_id: String,
    task: Option<JoinHandle<()>>,
}

impl MessageSubscription {
    /// Starts delivering messages newer than `cursor` into `buffer`.
    ///
    /// Offline backends get an idle handle: nothing new can ever arrive.
    pub fn start(
        backend: Backend,
        case_id: &str,
        buffer: MessageBuffer,
        cursor: DeliveryCursor,
        interval: Duration,
    ) -> Self {
        if backend.is_offline() {
            return Self {
                case_id: case_id.to_string(),
                task: None,
            };
        }

        tracing::debug!("Subscribing to messages of case {}", case_id);
        let task = tokio::spawn(poll_loop(
            backend,
            case_id.to_string(),
            buffer,
            cursor,
            interval,
        ));

        Self {
            case_id: case_id.to_string(),
            task: Some(task),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// Whether new messages are still being delivered.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Released message subscription of case {}", self.case_id);
        }
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    backend: Backend,
    case_id: String,
    buffer: MessageBuffer,
    mut cursor: DeliveryCursor,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let rows = match cursor.since() {
            Some(since) => backend.list_messages_since(&case_id, since).await,
            None => backend.list_messages(&case_id).await,
        };

        match rows {
            Ok(rows) => {
                let fresh = cursor.take_new(rows);
                if !fresh.is_empty() {
                    tracing::debug!("{} new message(s) for case {}", fresh.len(), case_id);
                }
                append_pushed(&buffer, fresh).await;
            }
            Err(e) => tracing::warn!("Message poll for case {} failed: {}", case_id, e),
        }
    }
}
