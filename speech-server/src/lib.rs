//! HTTP front end for a Kokoro speech pipeline.
//!
//! The server binds its port immediately, loads the expensive pipeline in the
//! background through [`EngineManager`], and serves two routes: `POST /tts`
//! turning text into a WAV response and a health check reporting readiness.

mod lifecycle;
mod web;

pub use lifecycle::{EngineManager, EngineStatus};
pub use web::{app, AppState, TtsRequest};
