//! Speech output capability and queue semantics.
//!
//! The queue is serial with priority reordering: high priority goes ahead of
//! queued normal items but behind whatever is already playing, unless
//! `interrupt` stops playback immediately; low priority is appended strictly
//! at the end. The queue belongs to the sink and never blocks the executor.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::ReaderResult;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Clone, Copy, Debug)]
pub struct SpeakOptions {
    pub priority: Priority,
    pub interrupt: bool,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            interrupt: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub priority: Priority,
}

/// Priority-ordered serial queue with one in-flight utterance.
#[derive(Debug, Default)]
pub struct SpeechQueue {
    playing: Option<Utterance>,
    queue: VecDeque<Utterance>,
}

impl SpeechQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, text: &str, options: SpeakOptions) {
        let utterance = Utterance {
            text: text.to_string(),
            priority: options.priority,
        };
        if options.interrupt {
            self.playing = None;
            self.queue.push_front(utterance);
            return;
        }
        let position = self
            .queue
            .iter()
            .position(|queued| queued.priority < options.priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(position, utterance);
    }

    /// Finish the current utterance and start the next queued one.
    pub fn advance(&mut self) -> Option<&Utterance> {
        self.playing = self.queue.pop_front();
        self.playing.as_ref()
    }

    pub fn playing(&self) -> Option<&Utterance> {
        self.playing.as_ref()
    }

    /// Stop playback and drop everything queued.
    pub fn stop(&mut self) {
        self.playing = None;
        self.queue.clear();
    }

    /// Drop queued utterances, leaving the current one playing.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn queued(&self) -> impl Iterator<Item = &Utterance> {
        self.queue.iter()
    }
}

/// Speech output seam. Speaking is fire-and-forget from the executor's
/// perspective; callers await only for turn-taking.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str, options: SpeakOptions) -> ReaderResult<()>;
    fn stop(&self);
    fn clear(&self);
}

/// Prints utterances to stdout. Playback is instantaneous, so the queue
/// drains fully on every speak call.
#[derive(Default)]
pub struct ConsoleSpeech {
    queue: Mutex<SpeechQueue>,
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechSink for ConsoleSpeech {
    async fn speak(&self, text: &str, options: SpeakOptions) -> ReaderResult<()> {
        let mut queue = self.queue.lock();
        queue.enqueue(text, options);
        while let Some(utterance) = queue.advance() {
            println!("{}", utterance.text);
        }
        Ok(())
    }

    fn stop(&self) {
        self.queue.lock().stop();
    }

    fn clear(&self) {
        self.queue.lock().clear();
    }
}

/// Records utterances instead of playing them, for tests.
#[derive(Default)]
pub struct MemorySpeech {
    spoken: Mutex<Vec<Utterance>>,
}

impl MemorySpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl SpeechSink for MemorySpeech {
    async fn speak(&self, text: &str, options: SpeakOptions) -> ReaderResult<()> {
        self.spoken.lock().push(Utterance {
            text: text.to_string(),
            priority: options.priority,
        });
        Ok(())
    }

    fn stop(&self) {
        self.spoken.lock().clear();
    }

    fn clear(&self) {}
}
