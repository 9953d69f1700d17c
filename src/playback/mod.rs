//! Assistant speech playback: the utterance queue and the side effects it
//! drives (speaker audio, avatar expressions).

pub mod audio;
pub mod expression;
pub mod queue;

pub use audio::{AudioOutput, output_for};
pub use expression::ExpressionController;
pub use queue::{PlaybackQueue, QueueSnapshot, Utterance};
