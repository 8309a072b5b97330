//! Various utility structs.
use std::hash::BuildHasherDefault;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use tokio::sync::mpsc;

/// Barrier that opens once every [`CompletionToken`] handed out by it has been dropped.
///
/// Holders release their token by dropping it, so a task releases it exactly once whatever way
/// it finishes, including panics.
pub struct CompletionBarrier {
    tx: mpsc::Sender<()>,
    rx: mpsc::Receiver<()>,
}

/// Outstanding participant of a [`CompletionBarrier`].
#[derive(Clone)]
pub struct CompletionToken {
    _tx: mpsc::Sender<()>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self { tx, rx }
    }

    pub fn token(&self) -> CompletionToken {
        CompletionToken { _tx: self.tx.clone() }
    }

    /// Waits until all tokens are dropped. Tokens can't be issued anymore afterwards.
    pub async fn wait(self) {
        let Self { tx, mut rx } = self;
        drop(tx);
        // nobody ever sends, recv returns None once the last sender is gone
        let _ = rx.recv().await;
    }
}

/// Current Unix time in microseconds.
pub fn unix_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}

/// IndexMap with faster hash function.
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
