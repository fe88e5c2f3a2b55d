use std::collections::VecDeque;

use anyhow::Context;
use companion_core::SessionError;
use companion_core::audio::{AudioCapture, CaptureSink};
use companion_types::audio::CAPTURE_SAMPLE_RATE;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio;

const RAW_CHANNEL_CAPACITY: usize = 256;

/// The system microphone, delivering mono PCM16 at `CAPTURE_SAMPLE_RATE`.
///
/// The device is opened on `start` and released on `stop`, so the
/// microphone is only held while the user is recording.
pub struct Microphone {
    device_name: Option<String>,
    chunk_size: usize,
    active: Option<Active>,
}

struct Active {
    // Dropping the stream closes the device.
    _stream: cpal::Stream,
    worker: JoinHandle<()>,
}

impl Microphone {
    pub fn new(device_name: Option<String>, chunk_size: usize) -> Self {
        Self {
            device_name,
            chunk_size: chunk_size.max(1),
            active: None,
        }
    }

    fn open(&self, sink: CaptureSink) -> anyhow::Result<Active> {
        let input = crate::device::get_or_default_input(self.device_name.as_deref())
            .context("Failed to get audio input device")?;
        tracing::info!("Using input device: {:?}", input.name().unwrap_or_default());

        let default_config = input
            .default_input_config()
            .context("Failed to get default input config")?;
        let input_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(self.chunk_size as u32)),
        };
        let input_channel_count = input_config.channels as usize;
        let input_sample_rate = input_config.sample_rate.0 as f64;
        tracing::debug!("Input stream config: {:?}", &input_config);

        let resampler = audio::create_resampler(
            input_sample_rate,
            CAPTURE_SAMPLE_RATE as f64,
            self.chunk_size,
        )?;

        // The device callback only downmixes; resampling happens on the worker.
        let (raw_tx, raw_rx) = mpsc::channel::<Vec<f32>>(RAW_CHANNEL_CAPACITY);
        let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Err(e) = raw_tx.try_send(audio::downmix(data, input_channel_count)) {
                tracing::warn!("Failed to send audio data to buffer: {:?}", e);
            }
        };

        let stream = input
            .build_input_stream(
                &input_config,
                input_data_fn,
                move |err| tracing::error!("An error occurred on input stream: {}", err),
                None,
            )
            .context("Failed to build input stream")?;
        stream.play().context("Failed to start input stream")?;

        let worker = tokio::spawn(encode_frames(raw_rx, resampler, self.chunk_size, sink));
        Ok(Active {
            _stream: stream,
            worker,
        })
    }
}

/// Resamples raw device audio in fixed chunks and forwards it as PCM16.
async fn encode_frames(
    mut raw_rx: mpsc::Receiver<Vec<f32>>,
    mut resampler: FastFixedIn<f32>,
    chunk_size: usize,
    sink: CaptureSink,
) {
    let mut buffer: VecDeque<f32> = VecDeque::with_capacity(chunk_size * 2);
    while let Some(samples) = raw_rx.recv().await {
        buffer.extend(samples);
        let mut resampled: Vec<f32> = vec![];
        while buffer.len() >= chunk_size {
            let audio_chunk: Vec<f32> = buffer.drain(..chunk_size).collect();
            match resampler.process(&[audio_chunk.as_slice()], None) {
                Ok(resamples) => {
                    if let Some(resamples) = resamples.first() {
                        resampled.extend(resamples.iter().cloned());
                    }
                }
                Err(e) => tracing::warn!("Failed to resample input audio: {}", e),
            }
        }
        if resampled.is_empty() {
            continue;
        }
        if sink.send(audio::convert_f32_to_i16(&resampled)).await.is_err() {
            tracing::debug!("Capture sink closed");
            break;
        }
    }
}

impl AudioCapture for Microphone {
    fn start(&mut self, sink: CaptureSink) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Ok(());
        }
        let active = self.open(sink).map_err(|e| {
            tracing::error!("Could not open microphone: {:#}", e);
            SessionError::DeviceUnavailable(format!("{:#}", e))
        })?;
        tracing::info!("Microphone open");
        self.active = Some(active);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.worker.abort();
            tracing::info!("Microphone closed");
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop();
    }
}
