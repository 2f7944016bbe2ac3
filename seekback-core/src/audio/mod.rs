//! Audio input: the [`AudioSource`] capability and its cpal implementation.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex held by the reader or perform I/O, so it
//! converts samples to i32, keeps channel 0, and pushes them into an SPSC
//! ring buffer producer. [`CpalSource::read_frame`] drains the consumer side
//! one frame at a time.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `CpalSource` therefore must be created and dropped on the same
//! thread; the recorder opens it inside its capture thread.

pub mod device;

use crate::buffering::frame::{FrameSpec, Sample};
use crate::error::Result;

/// A mono input stream delivering fixed-size frames.
///
/// Dropping the source closes the stream.
pub trait AudioSource {
    /// Frame geometry this source delivers.
    fn spec(&self) -> FrameSpec;

    /// Block until `frame.len()` samples are available and copy them into
    /// `frame`. `frame.len()` equals `spec().frame_size`.
    ///
    /// # Errors
    /// Any device failure. Callers treat these as fatal.
    fn read_frame(&mut self, frame: &mut [Sample]) -> Result<()>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn spec(&self) -> FrameSpec {
        (**self).spec()
    }

    fn read_frame(&mut self, frame: &mut [Sample]) -> Result<()> {
        (**self).read_frame(frame)
    }
}

#[cfg(feature = "audio-cpal")]
pub use cpal_source::CpalSource;

#[cfg(feature = "audio-cpal")]
mod cpal_source {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::{Duration, Instant};

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    };
    use parking_lot::Mutex;
    use ringbuf::{
        traits::{Consumer, Producer, Split},
        HeapCons, HeapProd, HeapRb,
    };
    use tracing::{error, info, warn};

    use super::AudioSource;
    use crate::buffering::frame::{FrameSpec, Sample};
    use crate::error::{Result, SeekbackError};

    /// Hand-off capacity between the callback and the reader: 2^17 samples
    /// ≈ 3 s at 44.1 kHz, enough to ride out a slow dump write.
    const HANDOFF_CAPACITY: usize = 1 << 17;

    /// Sleep between polls while the hand-off queue is empty.
    const POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// A device that delivers nothing for this long is treated as lost.
    const STALL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Handle to an open cpal input stream.
    ///
    /// **Not `Send`**: create and drop on the same OS thread.
    pub struct CpalSource {
        /// Kept alive so the stream is not dropped prematurely.
        _stream: Stream,
        consumer: HeapCons<Sample>,
        /// First stream error reported by the error callback.
        fault: Arc<Mutex<Option<String>>>,
        /// Samples the callback could not hand off.
        dropped: Arc<AtomicUsize>,
        spec: FrameSpec,
    }

    impl CpalSource {
        /// Open an input device by preferred name, otherwise the default
        /// input device, and start a mono stream at `spec.sample_rate`.
        ///
        /// # Errors
        /// `NoDefaultInputDevice` when no microphone is available,
        /// `AudioDevice` when the device cannot capture at the requested
        /// rate, `AudioStream` if cpal fails to build or start the stream.
        pub fn open(preferred_device_name: Option<&str>, spec: FrameSpec) -> Result<Self> {
            let device = select_device(preferred_device_name)?;
            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening input device"
            );

            let rate = spec.sample_rate;
            let supported = device
                .supported_input_configs()
                .map_err(|e| SeekbackError::AudioDevice(e.to_string()))?
                .filter(|c| c.min_sample_rate().0 <= rate && rate <= c.max_sample_rate().0)
                .filter(|c| format_rank(c.sample_format()).is_some())
                .min_by_key(|c| (c.channels(), format_rank(c.sample_format())))
                .ok_or_else(|| {
                    SeekbackError::AudioDevice(format!(
                        "device does not support {rate} Hz input in a usable sample format"
                    ))
                })?
                .with_sample_rate(SampleRate(rate));

            let channels = supported.channels();
            let format = supported.sample_format();
            info!(sample_rate = rate, channels, ?format, "audio config selected");
            if channels > 1 {
                warn!(channels, "device has no mono mode, recording channel 0 only");
            }

            let config = StreamConfig {
                channels,
                sample_rate: SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let (producer, consumer) = HeapRb::<Sample>::new(HANDOFF_CAPACITY).split();
            let fault = Arc::new(Mutex::new(None));
            let dropped = Arc::new(AtomicUsize::new(0));
            let hooks = CallbackHooks {
                producer,
                fault: Arc::clone(&fault),
                dropped: Arc::clone(&dropped),
                channels: channels as usize,
            };

            let stream = match format {
                SampleFormat::I32 => build_stream(&device, &config, hooks, |s: i32| s),
                SampleFormat::F32 => build_stream(&device, &config, hooks, |s: f32| {
                    (s.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32
                }),
                SampleFormat::I16 => build_stream(&device, &config, hooks, |s: i16| (s as i32) << 16),
                SampleFormat::U8 => {
                    build_stream(&device, &config, hooks, |s: u8| (s as i32 - 128) << 24)
                }
                fmt => {
                    return Err(SeekbackError::AudioStream(format!(
                        "unsupported sample format: {fmt:?}"
                    )))
                }
            }?;

            stream
                .play()
                .map_err(|e| SeekbackError::AudioStream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                consumer,
                fault,
                dropped,
                spec,
            })
        }
    }

    impl AudioSource for CpalSource {
        fn spec(&self) -> FrameSpec {
            self.spec
        }

        fn read_frame(&mut self, frame: &mut [Sample]) -> Result<()> {
            let mut filled = 0;
            let mut idle_since: Option<Instant> = None;
            while filled < frame.len() {
                if let Some(msg) = self.fault.lock().take() {
                    return Err(SeekbackError::AudioStream(msg));
                }
                let dropped = self.dropped.swap(0, Ordering::Relaxed);
                if dropped > 0 {
                    return Err(SeekbackError::Overrun { dropped });
                }

                let n = self.consumer.pop_slice(&mut frame[filled..]);
                if n > 0 {
                    filled += n;
                    idle_since = None;
                    continue;
                }

                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= STALL_TIMEOUT {
                    return Err(SeekbackError::AudioStream(format!(
                        "no audio from device for {}s",
                        STALL_TIMEOUT.as_secs()
                    )));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(())
        }
    }

    /// Everything the data callback owns.
    struct CallbackHooks {
        producer: HeapProd<Sample>,
        fault: Arc<Mutex<Option<String>>>,
        dropped: Arc<AtomicUsize>,
        channels: usize,
    }

    fn build_stream<T, F>(
        device: &Device,
        config: &StreamConfig,
        hooks: CallbackHooks,
        convert: F,
    ) -> Result<Stream>
    where
        T: SizedSample,
        F: Fn(T) -> Sample + Send + 'static,
    {
        let CallbackHooks {
            mut producer,
            fault,
            dropped,
            channels,
        } = hooks;
        let mut mono: Vec<Sample> = Vec::new();

        device
            .build_input_stream(
                config,
                move |data: &[T], _info: &cpal::InputCallbackInfo| {
                    mono.clear();
                    mono.extend(data.iter().step_by(channels).map(|s| convert(*s)));
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        dropped.fetch_add(mono.len() - written, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("audio stream error: {err}");
                    fault.lock().get_or_insert_with(|| err.to_string());
                },
                None,
            )
            .map_err(|e| SeekbackError::AudioStream(e.to_string()))
    }

    fn select_device(preferred_device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    if let Some(device) = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    }) {
                        return Ok(device);
                    }
                    warn!(
                        "preferred input device '{}' not found, falling back",
                        preferred_name
                    );
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        host.default_input_device()
            .ok_or(SeekbackError::NoDefaultInputDevice)
    }

    /// Preference order among sample formats we can convert; `None` for the
    /// rest.
    fn format_rank(format: SampleFormat) -> Option<u8> {
        match format {
            SampleFormat::I32 => Some(0),
            SampleFormat::F32 => Some(1),
            SampleFormat::I16 => Some(2),
            SampleFormat::U8 => Some(3),
            _ => None,
        }
    }
}
