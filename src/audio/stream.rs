use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use crossbeam::channel::Sender;
use log::{debug, info};
use rtrb::{Producer, RingBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::clock::{AudioClock, ClockState};
use super::tone::{ScheduledTone, ToneVoice};
use super::{AudioConfig, AudioEvent};
use crate::error::{MetronomeError, Result};

/// Upper bound on simultaneously sounding clicks inside the audio callback.
const MAX_VOICES: usize = 32;

/// Audio clock backed by a cpal output stream.
///
/// Time is the number of frames the output callback has rendered, so it
/// stands still while the stream is paused. Tones travel to the callback
/// through a lock-free ring buffer and start on their exact frame.
pub struct CpalClock {
    stream: Option<Stream>,
    producer: Producer<ScheduledTone>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
    state: ClockState,
    device_name: String,
}

impl CpalClock {
    pub fn open(config: &AudioConfig, event_sender: Sender<AudioEvent>) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_output_device(&host, config.output_device.as_deref())?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown".to_string());

        let output_default = device.default_output_config()?;
        debug!(
            "output device: {} ({}Hz, {}ch, {:?})",
            device_name,
            output_default.sample_rate().0,
            output_default.channels(),
            output_default.sample_format()
        );

        let stream_config = StreamConfig {
            channels: output_default.channels(),
            sample_rate: output_default.sample_rate(),
            buffer_size: config
                .buffer_size
                .map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
        };
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;

        let (producer, mut consumer) = RingBuffer::<ScheduledTone>::new(config.tone_queue_capacity);
        let frames = Arc::new(AtomicU64::new(0));
        let callback_frames = Arc::clone(&frames);
        let mut voices: Vec<ToneVoice> = Vec::with_capacity(MAX_VOICES);
        let err_sender = event_sender;

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                data.fill(0.0);

                while let Ok(tone) = consumer.pop() {
                    // Drop clicks rather than allocate in the callback
                    if voices.len() < MAX_VOICES {
                        voices.push(ToneVoice::new(&tone, sample_rate));
                    }
                }

                let first_frame = callback_frames.load(Ordering::Acquire);
                voices.retain_mut(|voice| voice.render_into(data, channels as usize, first_frame));

                for sample in data.iter_mut() {
                    *sample = sample.clamp(-1.0, 1.0);
                }

                let rendered = (data.len() / channels.max(1) as usize) as u64;
                callback_frames.fetch_add(rendered, Ordering::Release);
            },
            move |err| {
                // Error callbacks may run on the audio thread depending on backend
                let _ = err_sender.try_send(AudioEvent::Error(err.to_string()));
                let new_output = cpal::default_host()
                    .default_output_device()
                    .and_then(|d| d.name().ok());
                let _ = err_sender.try_send(AudioEvent::DeviceUpdated(new_output));
            },
            None,
        )?;
        stream.play()?;

        info!(
            "audio clock running on {} at {}Hz, {}ch",
            device_name, sample_rate, channels
        );

        Ok(Self {
            stream: Some(stream),
            producer,
            frames,
            sample_rate,
            channels,
            state: ClockState::Running,
            device_name,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioClock for CpalClock {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(MetronomeError::ClockReleased)?;
        stream.play()?;
        self.state = ClockState::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(MetronomeError::ClockReleased)?;
        stream.pause()?;
        self.state = ClockState::Suspended;
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the stream stops the callback
        if self.stream.take().is_some() {
            debug!("output stream on {} closed", self.device_name);
        }
        self.state = ClockState::Closed;
    }

    fn schedule_tone(&mut self, tone: ScheduledTone) -> Result<()> {
        if self.stream.is_none() {
            return Err(MetronomeError::ClockReleased);
        }
        self.producer
            .push(tone)
            .map_err(|_| MetronomeError::ToneQueueFull)
    }
}

/// Resolve an output device by name, or the host default when `name` is unset.
fn find_output_device(host: &Host, name: Option<&str>) -> Result<Device> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or(MetronomeError::NoOutputDevice);
    };

    for device in host.output_devices()? {
        if let Ok(device_name) = device.name()
            && device_name == name
        {
            return Ok(device);
        }
    }
    Err(MetronomeError::DeviceNotFound(name.to_string()))
}

pub fn enumerate_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut outputs = Vec::new();
    for device in host.output_devices()? {
        outputs.push(device.name().unwrap_or_else(|_| "Unknown".to_string()));
    }
    Ok(outputs)
}
