use std::sync::Arc;

use threadline_persist::{PersistError, PersistenceClient};
use threadline_types::{Message, MessageListParams, Thread, ThreadListParams};

use crate::controller::ThreadSession;
use crate::error::Result;
use crate::reconciler::MessageReconciler;

/// Thread list request detached from the session, so it can be awaited (or
/// spawned) while the session keeps processing events
pub struct PendingThreadsFetch {
    epoch: u64,
    params: ThreadListParams,
    persistence: Arc<dyn PersistenceClient>,
}

impl PendingThreadsFetch {
    pub async fn run(self) -> ThreadsFetch {
        let result = self.persistence.list_threads(&self.params).await;
        ThreadsFetch {
            epoch: self.epoch,
            result,
        }
    }
}

pub struct ThreadsFetch {
    epoch: u64,
    result: std::result::Result<Vec<Thread>, PersistError>,
}

/// Thread plus history request, see [`PendingThreadsFetch`]
pub struct PendingThreadFetch {
    epoch: u64,
    thread_id: String,
    persistence: Arc<dyn PersistenceClient>,
}

impl PendingThreadFetch {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn run(self) -> ThreadFetch {
        let result = load_thread(self.persistence.as_ref(), &self.thread_id).await;
        ThreadFetch {
            epoch: self.epoch,
            thread_id: self.thread_id,
            result,
        }
    }
}

pub struct ThreadFetch {
    epoch: u64,
    thread_id: String,
    result: std::result::Result<(Thread, Vec<Message>), PersistError>,
}

async fn load_thread(
    persistence: &dyn PersistenceClient,
    thread_id: &str,
) -> std::result::Result<(Thread, Vec<Message>), PersistError> {
    let thread = persistence.get_thread(thread_id).await?;
    let history = persistence
        .list_messages(thread_id, &MessageListParams::default())
        .await?;
    Ok((thread, history))
}

impl ThreadSession {
    pub fn begin_fetch_threads(&mut self, params: ThreadListParams) -> PendingThreadsFetch {
        self.is_loading = true;
        PendingThreadsFetch {
            epoch: self.auth_epoch,
            params,
            persistence: Arc::clone(&self.persistence),
        }
    }

    /// Apply a finished list fetch. Returns `Ok(false)` when the identity
    /// changed since the fetch began and the result was discarded.
    pub async fn apply_threads_fetch(&mut self, fetch: ThreadsFetch) -> Result<bool> {
        if fetch.epoch != self.auth_epoch {
            tracing::debug!("Discarding stale thread list");
            return Ok(false);
        }
        self.is_loading = false;

        match fetch.result {
            Ok(mut threads) => {
                if let Some(auth) = &self.auth {
                    for thread in threads.iter_mut() {
                        thread.user_role = Some(thread.derive_user_role(&auth.user_id));
                    }
                }
                self.threads = threads;
                self.error = None;
                Ok(true)
            }
            // Previously loaded threads stay in place
            Err(e) => Err(self.persist_failure("Failed to load threads", e).await),
        }
    }

    pub async fn fetch_threads(&mut self, params: ThreadListParams) -> Result<()> {
        self.require_auth()?;
        let fetch = self.begin_fetch_threads(params).run().await;
        self.apply_threads_fetch(fetch).await.map(|_| ())
    }

    pub fn begin_fetch_thread(&mut self, thread_id: &str) -> PendingThreadFetch {
        self.is_loading = true;
        PendingThreadFetch {
            epoch: self.thread_epoch,
            thread_id: thread_id.to_string(),
            persistence: Arc::clone(&self.persistence),
        }
    }

    /// Apply a finished thread fetch, merging history into the live list by
    /// id. Returns `Ok(false)` when the open thread changed in the meantime.
    ///
    /// A fetch for a thread other than the open one only refreshes its entry
    /// in the thread list.
    pub async fn apply_thread_fetch(&mut self, fetch: ThreadFetch) -> Result<bool> {
        if fetch.epoch != self.thread_epoch {
            tracing::debug!(thread_id = %fetch.thread_id, "Discarding stale thread fetch");
            return Ok(false);
        }
        self.is_loading = false;

        let (mut thread, history) = match fetch.result {
            Ok(loaded) => loaded,
            Err(e) => return Err(self.persist_failure("Failed to load thread", e).await),
        };

        let user_id = self.auth.as_ref().map(|a| a.user_id.clone()).unwrap_or_default();
        thread.user_role = Some(if self.presence.role_known() {
            self.presence.effective_role()
        } else {
            thread.derive_user_role(&user_id)
        });

        if let Some(entry) = self.threads.iter_mut().find(|t| t.id == thread.id) {
            entry.apply_update(thread.clone());
            entry.user_role = thread.user_role;
        }

        let is_open = self.current_thread.as_ref().is_some_and(|t| t.id == thread.id)
            || (self.active.is_none() && self.current_thread.is_none());
        if !is_open {
            return Ok(true);
        }

        let live = self
            .current_thread
            .as_ref()
            .map(|t| t.messages.clone())
            .unwrap_or_default();
        let merged = match &self.active {
            Some(active) => active.reconciler.merge_history(&live, history),
            None => MessageReconciler::new(&thread.id, &user_id).merge_history(&live, history),
        };

        thread.set_messages(merged);
        self.current_thread = Some(thread);
        self.error = None;
        Ok(true)
    }

    pub async fn fetch_thread(&mut self, thread_id: &str) -> Result<()> {
        self.require_auth()?;
        let fetch = self.begin_fetch_thread(thread_id).run().await;
        self.apply_thread_fetch(fetch).await.map(|_| ())
    }
}
