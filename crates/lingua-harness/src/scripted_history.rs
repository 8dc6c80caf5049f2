//! Scriptable history source.
//!
//! Replies are queued ahead of time and served in order; once the queue is
//! empty every fetch succeeds with no records. A gated source holds each
//! fetch until the test opens the gate, which is how tests place a live
//! message or a teardown in the middle of hydration.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use lingua_client::HistorySource;
use lingua_core::HydrationError;
use lingua_proto::{HistoryRecord, RoomId};
use tokio::sync::Semaphore;
use tracing::debug;

type Reply = Result<Vec<HistoryRecord>, HydrationError>;

#[derive(Default)]
struct Inner {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
}

/// [`HistorySource`] with canned replies.
///
/// Clones share the reply queue and the gate.
#[derive(Clone, Default)]
pub struct ScriptedHistory {
    inner: Arc<Inner>,
}

impl ScriptedHistory {
    /// Source that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose fetches wait for [`ScriptedHistory::release`].
    pub fn gated() -> Self {
        Self { inner: Arc::new(Inner { gate: Some(Semaphore::new(0)), ..Inner::default() }) }
    }

    /// Queue a successful reply.
    pub fn reply(&self, records: Vec<HistoryRecord>) -> &Self {
        self.push(Ok(records));
        self
    }

    /// Queue a failed reply.
    pub fn fail(&self, error: HydrationError) -> &Self {
        self.push(Err(error));
        self
    }

    /// Let one waiting (or future) fetch proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(1);
        }
    }

    /// Fetches started so far.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    fn push(&self, reply: Reply) {
        self.inner.replies.lock().unwrap_or_else(PoisonError::into_inner).push_back(reply);
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn fetch(&self, room_id: &RoomId) -> Result<Vec<HistoryRecord>, HydrationError> {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%room_id, call, "scripted history fetch");

        if let Some(gate) = &self.inner.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| HydrationError::Transport("history gate closed".into()))?;
            permit.forget();
        }

        self.inner
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
