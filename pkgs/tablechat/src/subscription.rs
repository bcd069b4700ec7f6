//! Change feed and snapshot subscriptions
//!
//! Every successful write publishes a [`StoreChange`]. A subscription listens
//! to the feed and, for each change it cares about, reloads the complete
//! result set and hands it to the callback. Writes made elsewhere on the same
//! database are picked up by polling a storage [`Watermark`]. Subscribers
//! never see diffs, so a missed or coalesced notification costs nothing but a
//! later reload.

use std::cmp::Reverse;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sea_orm::DbErr;
use tablechat_store::{Conversation, Watermark};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{ChatError, Result};

/// What kind of write happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ConversationCreated,
    ConversationClosed,
    MessageAppended,
    MessagesRead,
}

/// Notification published after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub kind: ChangeKind,
    pub conversation_id: String,
    pub user_id: String,
    pub restaurant_id: String,
}

impl StoreChange {
    pub fn for_conversation(kind: ChangeKind, conversation: &Conversation) -> Self {
        Self {
            kind,
            conversation_id: conversation.id.clone(),
            user_id: conversation.participants.user_id.clone(),
            restaurant_id: conversation.participants.restaurant_id.clone(),
        }
    }

    /// True when the message list of `conversation_id` may have changed
    pub fn affects_messages_of(&self, conversation_id: &str) -> bool {
        self.conversation_id == conversation_id
            && matches!(
                self.kind,
                ChangeKind::MessageAppended | ChangeKind::MessagesRead
            )
    }
}

/// Broadcast channel shared by all writers and subscribers of one service
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<StoreChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, change: StoreChange) {
        // No receivers simply means nobody is subscribed right now
        if self.sender.send(change).is_err() {
            debug!("Change published with no active subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where a subscription learns that its snapshot may be stale.
///
/// The feed carries writes made through the same service. The watermark is
/// read from storage every `poll_interval` and catches writes made by any
/// other service or process on the same database.
pub(crate) struct ChangeSource<M, W> {
    pub receiver: broadcast::Receiver<StoreChange>,
    pub is_relevant: M,
    pub watermark: W,
    pub poll_interval: Duration,
    /// Watermark read before the snapshot the caller already has
    pub seen: Watermark,
}

/// Handle to a live subscription.
///
/// Dropping the handle unsubscribes. Independent subscriptions never share
/// a handle, so each one must be dropped or unsubscribed on its own.
#[derive(Debug)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Start the refresh loop. `load` produces a full snapshot and
    /// `on_update` receives it. A failed refresh is delivered as an error
    /// once; the next successful refresh delivers a snapshot again.
    pub(crate) fn spawn<T, M, W, WFut, L, Fut, F>(
        source: ChangeSource<M, W>,
        load: L,
        mut on_update: F,
    ) -> Self
    where
        T: Send + 'static,
        M: Fn(&StoreChange) -> bool + Send + 'static,
        W: Fn() -> WFut + Send + Sync + 'static,
        WFut: Future<Output = std::result::Result<Watermark, DbErr>> + Send + 'static,
        L: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, DbErr>> + Send + 'static,
        F: FnMut(Result<T>) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let task = tokio::spawn(async move {
            let ChangeSource {
                mut receiver,
                is_relevant,
                watermark,
                poll_interval,
                mut seen,
            } = source;

            // interval() panics on a zero period
            let mut ticker = time::interval(poll_interval.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            let mut feed_open = true;
            let mut failing = false;

            loop {
                tokio::select! {
                    received = receiver.recv(), if feed_open => match received {
                        Ok(change) if !is_relevant(&change) => continue,
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Subscription lagged by {} changes, reloading", skipped);
                        }
                        Err(RecvError::Closed) => {
                            debug!("Change feed closed, polling storage only");
                            feed_open = false;
                            continue;
                        }
                    },
                    _ = ticker.tick() => match watermark().await {
                        Ok(current) if current == seen && !failing => continue,
                        Ok(_) => debug!("Storage changed outside this service, reloading"),
                        Err(e) => {
                            if flag.load(Ordering::SeqCst) {
                                break;
                            }
                            report_failure(&mut failing, &mut on_update, e);
                            continue;
                        }
                    },
                }

                // Anything queued meanwhile is covered by the reload below
                loop {
                    match receiver.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }

                if flag.load(Ordering::SeqCst) {
                    break;
                }
                // Watermark first: a write landing between the two reads
                // only causes one extra reload later
                let refreshed = async { Ok::<_, DbErr>((watermark().await?, load().await?)) }.await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                match refreshed {
                    Ok((mark, snapshot)) => {
                        seen = mark;
                        failing = false;
                        on_update(Ok(snapshot));
                    }
                    Err(e) => report_failure(&mut failing, &mut on_update, e),
                }
            }
            debug!("Subscription loop finished");
        });

        Self {
            cancelled,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop delivery. Safe to call any number of times. A delivery that is
    /// already running may finish, but no new one starts.
    pub fn unsubscribe(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Unsubscribing");
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn report_failure<T, F: FnMut(Result<T>)>(failing: &mut bool, on_update: &mut F, e: DbErr) {
    if *failing {
        debug!("Subscription refresh still failing: {}", e);
        return;
    }
    warn!("Failed to refresh subscription snapshot: {}", e);
    *failing = true;
    on_update(Err(ChatError::from(e)));
}

/// Most recently active first. Ties fall back to newest created, then id.
pub fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        (Reverse(a.last_message_at), Reverse(a.created_at), &a.id).cmp(&(
            Reverse(b.last_message_at),
            Reverse(b.created_at),
            &b.id,
        ))
    });
}
