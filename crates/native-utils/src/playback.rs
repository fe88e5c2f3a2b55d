use std::collections::VecDeque;

use anyhow::Context;
use companion_core::audio::AudioPlayback;
use companion_types::audio::PLAYBACK_SAMPLE_RATE;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;

use crate::audio;

const RESAMPLER_CHUNK_SIZE: usize = 100;

/// The system speaker, playing mono PCM16 at `PLAYBACK_SAMPLE_RATE`.
///
/// The output device is opened on the first `play`. If it cannot be opened
/// the failure is logged once and audio is dropped from then on.
pub struct Speaker {
    device_name: Option<String>,
    chunk_size: usize,
    buffer_ms: usize,
    output: Option<Output>,
    failed: bool,
}

struct Output {
    _stream: cpal::Stream,
    feed: Feed,
}

/// The producing side of the output ring buffer.
struct Feed {
    producer: HeapProd<f32>,
    resampler: FastFixedIn<f32>,
    // Samples waiting for a full resampler chunk.
    pending: VecDeque<f32>,
    capacity: usize,
    // Hands a fresh buffer to the output callback after `stop`.
    handoff: mpsc::UnboundedSender<HeapCons<f32>>,
}

/// The consuming side, owned by the output callback.
struct Playhead {
    consumer: HeapCons<f32>,
    handoff: mpsc::UnboundedReceiver<HeapCons<f32>>,
}

impl Speaker {
    pub fn new(device_name: Option<String>, chunk_size: usize, buffer_ms: usize) -> Self {
        Self {
            device_name,
            chunk_size: chunk_size.max(1),
            buffer_ms: buffer_ms.max(1),
            output: None,
            failed: false,
        }
    }

    fn open(&self) -> anyhow::Result<Output> {
        let output = crate::device::get_or_default_output(self.device_name.as_deref())
            .context("Failed to get audio output device")?;
        tracing::info!("Using output device: {:?}", output.name().unwrap_or_default());

        let default_config = output
            .default_output_config()
            .context("Failed to get default output config")?;
        let output_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(self.chunk_size as u32)),
        };
        let output_channel_count = output_config.channels as usize;
        let output_sample_rate = output_config.sample_rate.0 as usize;
        tracing::debug!("Output stream config: {:?}", &output_config);

        let resampler = audio::create_resampler(
            PLAYBACK_SAMPLE_RATE as f64,
            output_sample_rate as f64,
            RESAMPLER_CHUNK_SIZE,
        )?;
        let (feed, mut playhead) =
            Feed::new(resampler, output_sample_rate * self.buffer_ms / 1000);

        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            playhead.fill(data, output_channel_count);
        };

        let stream = output
            .build_output_stream(
                &output_config,
                output_data_fn,
                move |err| tracing::error!("An error occurred on output stream: {}", err),
                None,
            )
            .context("Failed to build output stream")?;
        stream.play().context("Failed to start output stream")?;

        Ok(Output {
            _stream: stream,
            feed,
        })
    }

    fn output(&mut self) -> Option<&mut Output> {
        if self.output.is_none() && !self.failed {
            match self.open() {
                Ok(output) => self.output = Some(output),
                Err(e) => {
                    tracing::error!("Audio playback disabled: {:#}", e);
                    self.failed = true;
                }
            }
        }
        self.output.as_mut()
    }
}

impl Feed {
    fn new(resampler: FastFixedIn<f32>, capacity: usize) -> (Self, Playhead) {
        let (producer, consumer) = audio::shared_buffer(capacity).split();
        let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
        let feed = Self {
            producer,
            resampler,
            pending: VecDeque::new(),
            capacity,
            handoff: handoff_tx,
        };
        let playhead = Playhead {
            consumer,
            handoff: handoff_rx,
        };
        (feed, playhead)
    }

    fn push(&mut self, pcm16: &[i16]) {
        self.pending.extend(audio::convert_i16_to_f32(pcm16));
        while self.pending.len() >= RESAMPLER_CHUNK_SIZE {
            let samples: Vec<f32> = self.pending.drain(..RESAMPLER_CHUNK_SIZE).collect();
            match self.resampler.process(&[samples.as_slice()], None) {
                Ok(resamples) => {
                    if let Some(resamples) = resamples.first() {
                        let pushed = self.producer.push_slice(resamples);
                        if pushed < resamples.len() {
                            tracing::warn!(
                                "Output buffer full, dropped {} samples",
                                resamples.len() - pushed
                            );
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to resample output audio: {}", e),
            }
        }
    }

    /// Abandons everything queued so far. Audio pushed afterwards lands in a
    /// new buffer that the callback switches to on its next run.
    fn stop(&mut self) {
        self.pending.clear();
        self.resampler.reset();
        let (producer, consumer) = audio::shared_buffer(self.capacity).split();
        self.producer = producer;
        if self.handoff.send(consumer).is_err() {
            tracing::debug!("Output callback is gone");
        }
    }
}

impl Playhead {
    fn fill(&mut self, data: &mut [f32], channel_count: usize) {
        while let Ok(fresh) = self.handoff.try_recv() {
            self.consumer = fresh;
        }
        // Same sample on every channel.
        for frame in data.chunks_mut(channel_count) {
            let sample = self.consumer.try_pop().unwrap_or(0.0);
            frame.fill(sample);
        }
    }
}

impl AudioPlayback for Speaker {
    fn play(&mut self, pcm16: Vec<i16>) {
        if let Some(output) = self.output() {
            output.feed.push(&pcm16);
        }
    }

    fn stop(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.feed.stop();
        }
    }
}
