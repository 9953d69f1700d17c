//! Sequential, interruptible playback of assistant utterances.
//!
//! Utterances play strictly one at a time in arrival order. Each one drives
//! three side effects: the avatar expression (if any), the subtitle text, and
//! either its audio or a simulated reading pause. A single drain task per
//! burst walks the queue in a loop; [`PlaybackQueue::interrupt`] cancels it
//! and leaves the queue empty before returning.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::playback::audio::AudioOutput;
use crate::playback::expression::ExpressionController;
use crate::sinks::SubtitleSink;

/// One unit of assistant speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Subtitle shown while the utterance plays.
    pub text: String,
    /// Encoded audio. `None` means a simulated reading delay instead.
    pub audio: Option<Bytes>,
    /// Backend expression name for the avatar.
    pub expression: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
            expression: None,
        }
    }

    pub fn with_audio(mut self, audio: Bytes) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// Point-in-time view of the queue, for status displays and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Texts of the utterances still waiting, in play order.
    pub pending: Vec<String>,
    /// Text of the utterance playing now.
    pub active: Option<String>,
    /// Subtitle currently on screen.
    pub subtitle: String,
}

/// FIFO utterance player. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

struct Inner {
    pacing: PlaybackConfig,
    expressions: ExpressionController,
    subtitles: Arc<dyn SubtitleSink>,
    audio: Option<Arc<dyn AudioOutput>>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Utterance>,
    active: Option<Utterance>,
    subtitle: String,
    /// Bumped by every interrupt; a drain task from an older generation exits.
    generation: u64,
    /// Cancels the in-flight step of the current drain task.
    step_cancel: Option<CancellationToken>,
}

/// What the drain task waits on for the active utterance.
enum Step {
    Audio(Bytes),
    Read(Duration),
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        }
    }

    fn set_subtitle(&self, state: &mut QueueState, text: &str) {
        state.subtitle.clear();
        state.subtitle.push_str(text);
        self.subtitles.set_subtitle(text);
    }

    /// Promote the head of `pending` to active and apply its visuals.
    fn start_next(&self, state: &mut QueueState) -> Option<Step> {
        let utterance = state.pending.pop_front()?;

        if let Some(ref name) = utterance.expression {
            self.expressions.show(name);
        }
        self.set_subtitle(state, &utterance.text);

        let step = match (&utterance.audio, &self.audio) {
            (Some(audio), Some(_)) => Step::Audio(audio.clone()),
            _ => Step::Read(self.pacing.reading_delay(&utterance.text)),
        };
        state.active = Some(utterance);
        Some(step)
    }

    /// Queue ran dry: clear the visuals.
    fn finish_drain(&self, state: &mut QueueState) {
        state.active = None;
        state.step_cancel = None;
        self.set_subtitle(state, "");
        self.expressions.reset();
        debug!("playback queue idle");
    }

    async fn perform(&self, step: Step, cancel: &CancellationToken) {
        match step {
            Step::Audio(audio) => {
                let Some(ref output) = self.audio else {
                    return;
                };
                if let Err(e) = output.play(audio, cancel.clone()).await {
                    warn!("speech playback failed, advancing queue: {e}");
                }
            }
            Step::Read(delay) => tokio::time::sleep(delay).await,
        }
    }
}

impl PlaybackQueue {
    pub fn new(
        pacing: PlaybackConfig,
        expressions: ExpressionController,
        subtitles: Arc<dyn SubtitleSink>,
        audio: Option<Arc<dyn AudioOutput>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pacing,
                expressions,
                subtitles,
                audio,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Append `utterance`; starts draining if nothing is playing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, utterance: Utterance) {
        let mut state = self.inner.state();
        state.pending.push_back(utterance);
        if state.active.is_some() {
            return;
        }

        let Some(step) = self.inner.start_next(&mut state) else {
            return;
        };
        let cancel = CancellationToken::new();
        state.step_cancel = Some(cancel.clone());
        let generation = state.generation;
        drop(state);

        tokio::spawn(drain(Arc::clone(&self.inner), step, generation, cancel));
    }

    /// Stop everything now: drop pending utterances, silence audio, clear
    /// the subtitle and reset the avatar. Safe to call at any time.
    pub fn interrupt(&self) {
        let mut state = self.inner.state();
        state.generation += 1;
        state.pending.clear();
        if let Some(cancel) = state.step_cancel.take() {
            cancel.cancel();
        }
        let was_playing = state.active.take().is_some();
        if was_playing || !state.subtitle.is_empty() {
            self.inner.set_subtitle(&mut state, "");
        }
        self.inner.expressions.reset();
        if was_playing {
            info!("playback interrupted");
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.state();
        state.active.is_none() && state.pending.is_empty()
    }

    /// True while an utterance is active.
    pub fn is_playing(&self) -> bool {
        self.inner.state().active.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    pub fn subtitle(&self) -> String {
        self.inner.state().subtitle.clone()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state();
        QueueSnapshot {
            pending: state.pending.iter().map(|u| u.text.clone()).collect(),
            active: state.active.as_ref().map(|u| u.text.clone()),
            subtitle: state.subtitle.clone(),
        }
    }
}

/// Play the active step, then keep promoting the next utterance until the
/// queue is empty or this generation is interrupted.
async fn drain(inner: Arc<Inner>, first: Step, generation: u64, cancel: CancellationToken) {
    let mut step = first;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = inner.perform(step, &cancel) => {}
        }

        let mut state = inner.state();
        if state.generation != generation {
            return;
        }
        state.active = None;
        match inner.start_next(&mut state) {
            Some(next) => step = next,
            None => {
                inner.finish_drain(&mut state);
                return;
            }
        }
    }
}
