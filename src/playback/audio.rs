//! Speech audio output.
//!
//! Utterance audio arrives as an encoded file (mp3 from the backend's TTS).
//! It is decoded with symphonia and, when the `audio-out` feature is enabled,
//! played to the system speakers via cpal.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::config::AudioConfig;
use crate::error::{NeuroError, Result};

/// Plays one utterance's audio to completion.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play `audio` and resolve when it ends naturally.
    ///
    /// Once `cancel` fires the output must go silent immediately and the
    /// call must return promptly, releasing the device.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Playback`] if the audio cannot be decoded or the
    /// device fails mid-play.
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> Result<()>;
}

/// Build the speaker output described by `config`, or `None` for text-only mode.
pub fn output_for(config: &AudioConfig) -> Option<Arc<dyn AudioOutput>> {
    if !config.enabled {
        return None;
    }
    #[cfg(feature = "audio-out")]
    {
        Some(Arc::new(CpalAudioOutput::new(config)))
    }
    #[cfg(not(feature = "audio-out"))]
    {
        tracing::warn!("built without the `audio-out` feature; speech audio is disabled");
        None
    }
}

/// Decode an encoded audio file into mono f32 samples.
///
/// Multi-channel audio is down-mixed by averaging. Returns the samples and
/// their sample rate.
///
/// # Errors
///
/// Returns [`NeuroError::Playback`] if the container or codec is unsupported
/// or the data is corrupt.
pub fn decode_to_mono(audio: &Bytes) -> Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let source = std::io::Cursor::new(audio.clone());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| NeuroError::Playback(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| NeuroError::Playback("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| NeuroError::Playback("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| NeuroError::Playback(format!("failed to create decoder: {e}")))?;

    let mut out: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(NeuroError::Playback(format!("audio read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(NeuroError::Playback(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        if channels <= 1 {
            out.extend_from_slice(buf.samples());
        } else {
            out.extend(
                buf.samples()
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    Ok((out, sample_rate))
}

/// Speaker output through the default (or a named) cpal device.
#[cfg(feature = "audio-out")]
pub struct CpalAudioOutput {
    output_device: Option<String>,
}

#[cfg(feature = "audio-out")]
impl CpalAudioOutput {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            output_device: config.output_device.clone(),
        }
    }
}

#[cfg(feature = "audio-out")]
#[async_trait]
impl AudioOutput for CpalAudioOutput {
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> Result<()> {
        let device_name = self.output_device.clone();
        tokio::task::spawn_blocking(move || {
            let (samples, sample_rate) = decode_to_mono(&audio)?;
            cpal_output::play_blocking(device_name.as_deref(), samples, sample_rate, &cancel)
        })
        .await
        .map_err(|e| NeuroError::Playback(format!("playback thread failed: {e}")))?
    }
}

#[cfg(feature = "audio-out")]
mod cpal_output {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tokio_util::sync::CancellationToken;
    use tracing::{error, info};

    use crate::error::{NeuroError, Result};

    /// Internal buffer for tracking playback progress.
    struct PlaybackBuffer {
        samples: Vec<f32>,
        position: usize,
        finished: bool,
        failed: Option<String>,
    }

    fn open_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let device = if let Some(name) = name {
            host.output_devices()
                .map_err(|e| NeuroError::Playback(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| NeuroError::Playback(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| NeuroError::Playback("no default output device".into()))?
        };
        Ok(device)
    }

    /// Play mono samples, blocking until they finish or `cancel` fires.
    pub(super) fn play_blocking(
        device_name: Option<&str>,
        samples: Vec<f32>,
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let device = open_device(device_name)?;
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples,
            position: 0,
            finished: false,
            failed: None,
        }));

        let data_buffer = Arc::clone(&buffer);
        let data_cancel = cancel.clone();
        let err_buffer = Arc::clone(&buffer);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match data_buffer.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };
                    let stopped = data_cancel.is_cancelled();

                    for sample in data.iter_mut() {
                        if !stopped && buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                    if let Ok(mut buf) = err_buffer.lock() {
                        buf.failed = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| NeuroError::Playback(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| NeuroError::Playback(format!("failed to start output stream: {e}")))?;

        loop {
            std::thread::sleep(Duration::from_millis(10));
            if cancel.is_cancelled() {
                info!("speech playback stopped");
                break;
            }
            let buf = buffer
                .lock()
                .map_err(|e| NeuroError::Playback(format!("playback buffer lock poisoned: {e}")))?;
            if let Some(ref failure) = buf.failed {
                return Err(NeuroError::Playback(failure.clone()));
            }
            if buf.finished {
                break;
            }
        }

        drop(stream);
        Ok(())
    }
}
