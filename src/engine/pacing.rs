//! Coalesced deal scheduling.
//!
//! Automatic deals are paced by a short delay so clients can follow the
//! action, but pacing must never cost correctness: requests are queued and
//! deduplicated, and an atomic flag guarantees at most one sleeping drain
//! task per process. A request arriving while a drain is active is simply
//! appended; the drain picks it up before releasing the flag, so no deal is
//! ever lost to coalescing.

use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::game::{GameId, PlayerId};

/// Deduplicated queue of pending deals with single-drainer claiming.
#[derive(Debug, Default)]
pub(crate) struct DealQueue {
    queue: Mutex<VecDeque<(GameId, PlayerId)>>,
    active: AtomicBool,
}

impl DealQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<(GameId, PlayerId)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a deal request. Returns `true` when the caller claimed the
    /// drain and must start a drain task.
    pub fn enqueue(&self, game: &str, player: &str) -> bool {
        let request = (game.to_string(), player.to_string());
        {
            let mut queue = self.lock();
            if !queue.contains(&request) {
                queue.push_back(request);
            }
        }
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Pop the next pending deal, or release the drain claim when the
    /// queue is empty. Re-claims if a request slipped in between the pop
    /// and the release, so the drain flag can never strand work.
    pub fn pop_or_release(&self) -> Option<(GameId, PlayerId)> {
        loop {
            if let Some(request) = self.lock().pop_front() {
                return Some(request);
            }
            self.active.store(false, Ordering::SeqCst);
            if self.lock().is_empty() {
                return None;
            }
            if self
                .active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Another requester claimed the drain; let them have it.
                return None;
            }
        }
    }
}
