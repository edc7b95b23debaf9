//! In-process cameras for tests

use super::{DecodeOutcome, LiveScanner, LiveStream};
use crate::error::AccessError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Plays a fixed list of outcomes, then ends the stream
pub(crate) struct ScriptedScanner {
    outcomes: Vec<DecodeOutcome>,
}

impl ScriptedScanner {
    pub fn new(outcomes: Vec<DecodeOutcome>) -> Self {
        Self { outcomes }
    }
}

struct ScriptedStream {
    outcomes: VecDeque<DecodeOutcome>,
}

#[async_trait]
impl LiveScanner for ScriptedScanner {
    async fn open(&self) -> Result<Box<dyn LiveStream>, AccessError> {
        Ok(Box::new(ScriptedStream {
            outcomes: self.outcomes.clone().into(),
        }))
    }
}

#[async_trait]
impl LiveStream for ScriptedStream {
    async fn next_outcome(&mut self) -> Option<DecodeOutcome> {
        self.outcomes.pop_front()
    }
}

/// A camera that stays open until its stream is dropped, counting how
/// often it was opened and released
#[derive(Default)]
pub(crate) struct HeldScanner {
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl HeldScanner {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct HeldStream {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveScanner for HeldScanner {
    async fn open(&self) -> Result<Box<dyn LiveStream>, AccessError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HeldStream {
            released: self.released.clone(),
        }))
    }
}

#[async_trait]
impl LiveStream for HeldStream {
    async fn next_outcome(&mut self) -> Option<DecodeOutcome> {
        std::future::pending().await
    }
}

impl Drop for HeldStream {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
