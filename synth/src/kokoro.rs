//! HTTP client for a Kokoro engine runtime.
//!
//! The runtime hosts the actual model. [`KokoroPipeline::connect`] asks it to
//! load the pipeline once with a fixed configuration and records the sample
//! rate it will produce; [`KokoroPipeline::synthesize`] then streams
//! newline-delimited JSON fragments back for each request.

use crate::{Result, SpeechChunk, SpeechRequest, SpeechStream, SynthError, Synthesizer};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::info;

/// Fixed pipeline configuration, decided at deploy time.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Base URL of the engine runtime, e.g. `http://localhost:8880`.
    pub base_url: String,
    /// Voice identity, e.g. `af_heart`.
    pub voice: String,
    /// Kokoro language code (`a` = American English).
    pub lang_code: String,
    /// Compute device the runtime should load onto.
    pub device: String,
    /// Default speech rate multiplier.
    pub speed: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8880".into(),
            voice: "af_heart".into(),
            lang_code: "a".into(),
            device: "cpu".into(),
            speed: 1.0,
        }
    }
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    voice: &'a str,
    lang_code: &'a str,
    device: &'a str,
    speed: f32,
}

#[derive(Deserialize)]
struct LoadResponse {
    sample_rate: u32,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    speed: f32,
}

#[derive(Deserialize)]
struct WireChunk {
    #[serde(default)]
    text: String,
    #[serde(default)]
    phonemes: String,
    #[serde(default)]
    samples: Vec<f32>,
    sample_rate: Option<u32>,
    error: Option<String>,
}

/// A loaded Kokoro pipeline handle.
///
/// Created at most once per process; immutable after [`connect`] succeeds.
///
/// [`connect`]: KokoroPipeline::connect
#[derive(Debug)]
pub struct KokoroPipeline {
    client: Client,
    base_url: String,
    voice: String,
    speed: f32,
    sample_rate: u32,
}

impl KokoroPipeline {
    /// Ask the runtime to load the pipeline described by `config`.
    ///
    /// This is the expensive initialization step: the runtime pulls model
    /// weights onto the configured device before answering. Fails without
    /// side effects; the caller decides whether the process stays up.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let client = Client::new();
        let resp = client
            .post(format!("{}/load", config.base_url))
            .json(&LoadRequest {
                voice: &config.voice,
                lang_code: &config.lang_code,
                device: &config.device,
                speed: config.speed,
            })
            .send()
            .await
            .map_err(|e| SynthError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(SynthError::Engine(format!(
                "load failed with {status}: {detail}"
            )));
        }
        let load: LoadResponse = resp
            .json()
            .await
            .map_err(|e| SynthError::InvalidResponse(e.to_string()))?;
        info!(
            voice = %config.voice,
            sample_rate = load.sample_rate,
            "kokoro pipeline loaded"
        );
        Ok(Self {
            client,
            base_url: config.base_url,
            voice: config.voice,
            speed: config.speed,
            sample_rate: load.sample_rate,
        })
    }

    /// Output sample rate advertised by the loaded pipeline.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait]
impl Synthesizer for KokoroPipeline {
    async fn synthesize(&self, req: &SpeechRequest) -> Result<SpeechStream> {
        let resp = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&SynthesizeRequest {
                text: &req.text,
                voice: req.voice.as_deref().unwrap_or(&self.voice),
                speed: req.speed.unwrap_or(self.speed),
            })
            .send()
            .await
            .map_err(|e| SynthError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(SynthError::Engine(format!(
                "synthesis failed with {status}: {detail}"
            )));
        }

        let default_rate = self.sample_rate;
        let mut body = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut buf: Vec<u8> = Vec::new();
            loop {
                let part = match body.next().await {
                    Some(Ok(bytes)) => Some(bytes),
                    Some(Err(e)) => {
                        yield Err(SynthError::Network(e.to_string()));
                        return;
                    }
                    None => None,
                };
                match part {
                    Some(bytes) => buf.extend_from_slice(&bytes),
                    // Flush whatever remains as a final line.
                    None => {
                        if !buf.iter().all(u8::is_ascii_whitespace) {
                            yield decode_line(&buf, default_rate);
                        }
                        return;
                    }
                }
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let chunk = decode_line(&line, default_rate);
                    let failed = chunk.is_err();
                    yield chunk;
                    if failed {
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn engine_name(&self) -> &str {
        "kokoro"
    }
}

fn decode_line(line: &[u8], default_rate: u32) -> Result<SpeechChunk> {
    let wire: WireChunk = serde_json::from_slice(line)
        .map_err(|e| SynthError::InvalidResponse(e.to_string()))?;
    if let Some(message) = wire.error {
        return Err(SynthError::Engine(message));
    }
    Ok(SpeechChunk {
        text: wire.text,
        phonemes: wire.phonemes,
        samples: wire.samples,
        sample_rate: wire.sample_rate.unwrap_or(default_rate),
    })
}
