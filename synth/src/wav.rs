//! In-memory WAV container encoding.

use crate::{AudioClip, Result};
use std::io::Cursor;

/// Encode `clip` as a standard RIFF/WAVE byte buffer: mono, 16-bit PCM.
///
/// Samples outside [-1, 1] are clamped before scaling.
pub fn encode(clip: &AudioClip) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &sample in &clip.samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}
