//! Audio payload decoding
//!
//! Agent audio arrives as opaque bytes. WAV and MP3 are recognized by their
//! headers; everything is downmixed to mono f32 and resampled for playback.

use std::io::Cursor;

use crate::{Error, Result};

/// Sample rate used for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Decode an audio payload to mono samples at `target_rate`
///
/// # Errors
///
/// Returns error if the payload is not decodable WAV or MP3
pub fn decode_payload(bytes: &[u8], target_rate: u32) -> Result<Vec<f32>> {
    let (samples, rate) = if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)?
    } else {
        decode_mp3(bytes)?
    };

    tracing::trace!(samples = samples.len(), rate, target_rate, "payload decoded");

    if rate == target_rate || samples.is_empty() {
        Ok(samples)
    } else {
        resample(&samples, rate, target_rate)
    }
}

/// Decode WAV bytes, returning mono samples and their sample rate
#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Playback(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(e.to_string()))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

/// Decode MP3 bytes, returning mono samples and their sample rate
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if rate.is_none() {
                    #[allow(clippy::cast_sign_loss)]
                    let frame_rate = frame.sample_rate as u32;
                    rate = Some(frame_rate);
                }

                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    let rate = rate.ok_or_else(|| Error::Playback("no audio frames in payload".to_string()))?;
    Ok((samples, rate))
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
///
/// The final partial chunk is zero-padded and the output trimmed to the
/// expected length.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let expected = (input.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);
    let mut offset = 0;

    // Feed silence past the end so the resampler's delay line is flushed
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut chunk = vec![0.0; needed];
        if offset < input.len() {
            let end = (offset + needed).min(input.len());
            chunk[..end - offset].copy_from_slice(&input[offset..end]);
            offset = end;
        }

        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

/// Encode mono f32 samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Generate a sine tone, used to check the speaker
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn tone(frequency: f32, duration_ms: u32, sample_rate: u32) -> Vec<f32> {
    let count = (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
