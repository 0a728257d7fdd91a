//! Microphone capture (feature `mic`): records a fixed duration from the
//! system's default input device and feeds it through the same
//! recognition path as file input.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use log::info;

use crate::error::Error;

/// Records `seconds` of audio from the default input device, returning a
/// single mono channel of `f32` samples plus the device's sample rate.
pub fn capture(seconds: f64) -> Result<(Vec<f32>, u32), Error> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Config("no default input device".to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|e| Error::Config(format!("no usable input config: {e}")))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();

    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let stream_buffer = buffer.clone();

    let err_fn = |err| log::warn!("microphone input stream error: {err}");

    // cpal yields samples normalized to [-1.0, 1.0] regardless of the
    // device's native format; rescale to the same int16 reference range
    // `decode::decode_wav` uses, since the fingerprinting pipeline's
    // `amp_min` floor is calibrated against that scale (see DESIGN.md).
    const INT16_SCALE: f32 = 32_768.0;

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                let scaled: Vec<f32> = data.iter().map(|&s| s * INT16_SCALE).collect();
                push_mono(&stream_buffer, &scaled, channels);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _| {
                let floats: Vec<f32> = data.iter().map(|&s| s as f32).collect();
                push_mono(&stream_buffer, &floats, channels);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(Error::Config(format!(
                "unsupported microphone sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| Error::Config(format!("failed to build input stream: {e}")))?;

    info!("recording {seconds:.1}s from default input device at {sample_rate} Hz");
    stream
        .play()
        .map_err(|e| Error::Config(format!("failed to start input stream: {e}")))?;
    std::thread::sleep(Duration::from_secs_f64(seconds));
    drop(stream);

    let samples = Arc::try_unwrap(buffer)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());

    Ok((samples, sample_rate))
}

fn push_mono(buffer: &Arc<Mutex<Vec<f32>>>, data: &[f32], channels: usize) {
    let mut buf = buffer.lock().unwrap();
    if channels <= 1 {
        buf.extend_from_slice(data);
    } else {
        buf.extend(data.chunks_exact(channels).map(|frame| {
            frame.iter().sum::<f32>() / channels as f32
        }));
    }
}
