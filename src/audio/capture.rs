//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! The driver callback only copies samples: it accumulates until a full
//! block is ready, then pushes the frame into the queue producer. All
//! gating, denoising, and recognition happen on the pipeline thread.

use crate::audio::queue::FrameProducer;
use crate::error::{EcouteError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Run a closure with stderr redirected to /dev/null.
///
/// CPAL probing makes ALSA/JACK print harmless but alarming noise on
/// stderr; that must never reach the elderly operator's screen.
///
/// # Safety
/// Saves and restores fd 2 via `libc::dup`/`libc::dup2`; no other thread
/// may manipulate fd 2 concurrently.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Desktop audio servers to prefer, so the system's mic selection is kept.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "pulseaudio"];

/// Name fragments of devices that can never be a voice microphone.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "digital output",
    "hdmi",
    "s/pdif",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS.iter().any(|p| lower.contains(p))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|p| lower.contains(p))
}

/// List usable audio input devices, preferred ones marked "\[recommended\]".
/// Devices that cannot be a microphone (surround channels, HDMI outputs)
/// are dropped from the listing.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| EcouteError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let names = devices
        .filter_map(|device| device.name().ok())
        .filter(|name| !should_filter_device(name))
        .map(|name| {
            if is_preferred_device(&name) {
                format!("{} [recommended]", name)
            } else {
                name
            }
        })
        .collect();

    Ok(names)
}

/// The best default input device: a desktop audio server if one is
/// registered, otherwise whatever the host calls its default.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| EcouteError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is owned by MicCapture and only touched from the
/// thread that calls start/stop; it never crosses threads while in use.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone frame source: slices the callback's sample stream into
/// fixed-size blocks and pushes them to the frame queue.
pub struct MicCapture {
    device: cpal::Device,
    stream: Option<SendableStream>,
    sample_rate: u32,
    block_size: usize,
}

impl MicCapture {
    /// Create a capture handle for the named device (or the best default).
    pub fn new(device_name: Option<&str>, sample_rate: u32, block_size: usize) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| EcouteError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| EcouteError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: None,
            sample_rate,
            block_size,
        })
    }

    /// Start capturing; complete frames are pushed to `producer` from the
    /// driver's callback thread.
    ///
    /// Tries i16 mono at the target rate first (PipeWire/PulseAudio convert
    /// transparently), then f32 mono.
    pub fn start(&mut self, producer: FrameProducer) -> Result<()> {
        if self.stream.is_some() {
            return Ok(()); // Already started
        }

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("ecoute: audio stream error: {}", err);
        };

        let block_size = self.block_size;

        // Try i16 at the target config.
        {
            let producer = producer.clone();
            let mut pending: Vec<i16> = Vec::with_capacity(block_size * 2);
            if let Ok(stream) = self.device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);
                    while pending.len() >= block_size {
                        let frame: Vec<i16> = pending.drain(..block_size).collect();
                        producer.push(frame);
                    }
                },
                err_callback,
                None,
            ) {
                stream.play().map_err(|e| EcouteError::AudioCapture {
                    message: format!("Failed to start audio stream: {}", e),
                })?;
                self.stream = Some(SendableStream(stream));
                return Ok(());
            }
        }

        // Fall back to f32 for devices that only expose float formats.
        let mut pending: Vec<i16> = Vec::with_capacity(block_size * 2);
        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    );
                    while pending.len() >= block_size {
                        let frame: Vec<i16> = pending.drain(..block_size).collect();
                        producer.push(frame);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| EcouteError::AudioCapture {
                message: format!("Failed to build audio stream: {}", e),
            })?;

        stream.play().map_err(|e| EcouteError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    /// Stop capturing and release the stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(sendable_stream) = self.stream.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| EcouteError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_create_with_invalid_device_name() {
        let capture = MicCapture::new(Some("NonExistentDevice12345"), 16_000, 8_000);
        match capture {
            Err(EcouteError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            // Hosts without any backend report enumeration failure instead.
            Err(EcouteError::AudioCapture { .. }) => {}
            Ok(_) => panic!("Expected an error for a bogus device name"),
            Err(e) => panic!("Unexpected error: {e}"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_returns_at_least_one_device() {
        let devices = list_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_start_stop_pushes_frames() {
        use crate::audio::queue::frame_queue;
        use std::time::Duration;

        let (producer, consumer) = frame_queue(4);
        let mut capture = MicCapture::new(None, 16_000, 1_600).unwrap();
        capture.start(producer).unwrap();

        let frame = consumer.pop(Duration::from_secs(2));
        capture.stop().unwrap();

        let frame = frame.expect("expected at least one captured frame");
        assert_eq!(frame.len(), 1_600);
    }
}
