//! Speech synthesis abstractions for the Kokoro audio service.
//!
//! The `synth` crate defines a [`Synthesizer`] trait along with the concrete
//! [`KokoroPipeline`] implementation. Utilities are provided for draining a
//! chunked synthesis stream into a single clip and for encoding clips as WAV.

pub mod kokoro;
pub mod wav;

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::StreamExt;

pub use kokoro::{KokoroPipeline, PipelineConfig};

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("engine unreachable: {0}")]
    Network(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
    #[error("engine produced no audio")]
    Empty,
    #[error("sample rate changed mid-stream ({expected} then {got})")]
    SampleRateMismatch { expected: u32, got: u32 },
    #[error(transparent)]
    Wav(#[from] hound::Error),
}

/// Convenience result type used throughout this crate.
pub type Result<T> = std::result::Result<T, SynthError>;

/// One synthesis call: the text to speak plus optional overrides of the
/// pipeline's configured voice and speech rate.
#[derive(Clone, Debug)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            speed: None,
        }
    }
}

/// One fragment produced by a segmenting pipeline: the text slice it covers,
/// its phonemization and the raw samples for that slice.
#[derive(Clone, Debug)]
pub struct SpeechChunk {
    pub text: String,
    pub phonemes: String,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Stream of synthesized audio fragments.
pub type SpeechStream = Pin<Box<dyn Stream<Item = Result<SpeechChunk>> + Send>>;

/// A fully drained synthesis result.
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Text-to-speech engine interface.
///
/// Implementations must be `Send` and `Sync` so a single loaded engine can be
/// shared by every request handler. A call is a stateless transformation;
/// implementations hold no cross-call state.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Return a stream of audio fragments for `req`.
    async fn synthesize(&self, req: &SpeechRequest) -> Result<SpeechStream>;

    /// Short engine identifier reported by the health endpoint.
    fn engine_name(&self) -> &str;
}

/// Exhaust `stream` and concatenate its fragments, in order, into one clip.
///
/// The whole stream is consumed before returning; nothing is delivered
/// progressively. Fails if the stream yields no samples at all or if the
/// sample rate changes between fragments.
pub async fn drain(mut stream: SpeechStream) -> Result<AudioClip> {
    let mut samples = Vec::new();
    let mut rate = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        match rate {
            None => rate = Some(chunk.sample_rate),
            Some(expected) if expected != chunk.sample_rate => {
                return Err(SynthError::SampleRateMismatch {
                    expected,
                    got: chunk.sample_rate,
                });
            }
            Some(_) => {}
        }
        samples.extend_from_slice(&chunk.samples);
    }
    let sample_rate = rate.ok_or(SynthError::Empty)?;
    if samples.is_empty() {
        return Err(SynthError::Empty);
    }
    Ok(AudioClip {
        samples,
        sample_rate,
    })
}
