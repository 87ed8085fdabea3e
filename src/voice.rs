//! Voice note capture.
//!
//! `VoiceRecorder` drives a pluggable `AudioSource`, buffers the chunks it emits
//! and counts elapsed seconds on a ticker thread while recording. The built-in
//! microphone source (feature `microphone`) captures with cpal on a dedicated
//! thread and emits one WAV chunk when closed.

use hound::{WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const WAV_MIME_TYPE: &str = "audio/wav";

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur during voice capture
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to get device config: {0}")]
    DeviceConfig(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start audio stream: {0}")]
    StreamStart(String),

    #[error("Failed to encode audio: {0}")]
    Encoding(String),

    #[error("Capture thread error: {0}")]
    ThreadError(String),

    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Microphone capture is not available in this build")]
    Unsupported,
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    /// Load a clip from disk, inferring the MIME type from the extension.
    pub fn from_file(path: &Path) -> Result<Self, VoiceError> {
        let bytes = std::fs::read(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = match ext.as_str() {
            "wav" => WAV_MIME_TYPE,
            "mp3" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            "ogg" | "oga" => "audio/ogg",
            _ => "audio/webm",
        };
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Shared chunk buffer an `AudioSource` appends to.
#[derive(Debug, Clone, Default)]
pub struct ChunkSink {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ChunkSink {
    pub fn push(&self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(chunk);
        }
    }

    /// Drain every chunk and concatenate them in arrival order.
    fn take_concatenated(&self) -> Vec<u8> {
        self.chunks
            .lock()
            .map(|mut c| std::mem::take(&mut *c).concat())
            .unwrap_or_default()
    }

    fn clear(&self) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.clear();
        }
    }
}

/// Something that produces encoded audio chunks.
pub trait AudioSource: Send {
    /// MIME type of the concatenated chunks.
    fn mime_type(&self) -> &str;

    /// Begin capturing; chunks go to `sink` until `close`.
    fn open(&mut self, sink: ChunkSink) -> Result<(), VoiceError>;

    /// Stop capturing and flush any pending chunk. Must be safe to call twice.
    fn close(&mut self);
}

/// Elapsed-seconds counter on its own thread.
struct Ticker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn(elapsed: Arc<AtomicU64>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    elapsed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        });
        Self { stop_tx, handle }
    }

    fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Idle/Recording state machine around an `AudioSource`.
pub struct VoiceRecorder {
    source: Box<dyn AudioSource>,
    sink: ChunkSink,
    elapsed: Arc<AtomicU64>,
    ticker: Option<Ticker>,
    tick_interval: Duration,
}

impl VoiceRecorder {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self {
            source,
            sink: ChunkSink::default(),
            elapsed: Arc::new(AtomicU64::new(0)),
            ticker: None,
            tick_interval: TICK_INTERVAL,
        }
    }

    /// Override the ticker period (tests).
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn state(&self) -> RecorderState {
        if self.ticker.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Seconds elapsed in the current (or last) recording.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    /// Start recording. No-op when already recording.
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.is_recording() {
            log::debug!("Voice recorder already recording; ignoring start");
            return Ok(());
        }

        self.sink.clear();
        self.elapsed.store(0, Ordering::SeqCst);
        self.source.open(self.sink.clone())?;
        self.ticker = Some(Ticker::spawn(self.elapsed.clone(), self.tick_interval));

        log::info!("Voice recording started ({})", self.source.mime_type());
        Ok(())
    }

    /// Stop recording and return the buffered audio; `None` when idle.
    pub fn stop(&mut self) -> Option<AudioClip> {
        if !self.release() {
            return None;
        }

        let bytes = self.sink.take_concatenated();
        log::info!(
            "Voice recording stopped: {} bytes after {}s",
            bytes.len(),
            self.elapsed_secs()
        );
        Some(AudioClip {
            bytes,
            mime_type: self.source.mime_type().to_string(),
        })
    }

    /// Stop recording and discard the audio.
    pub fn cancel(&mut self) {
        if self.release() {
            self.sink.clear();
            log::info!("Voice recording cancelled");
        }
    }

    /// Close the source and join the ticker. Returns whether a recording was active.
    fn release(&mut self) -> bool {
        let Some(ticker) = self.ticker.take() else {
            return false;
        };
        self.source.close();
        ticker.stop();
        true
    }
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Audio buffer that accumulates interleaved f32 samples during recording.
///
/// Append-only: once the max duration is reached later samples are dropped and
/// the buffer is marked truncated.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    max_samples: usize,
    truncated: bool,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, max_duration_secs: f32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
            max_samples: (sample_rate as f32 * max_duration_secs * channels as f32) as usize,
            truncated: false,
        }
    }

    /// Append samples up to the max duration. Returns false once the buffer is full.
    pub fn append(&mut self, new_samples: &[f32]) -> bool {
        let room = self.max_samples.saturating_sub(self.samples.len());
        let take = room.min(new_samples.len());
        self.samples.extend_from_slice(&new_samples[..take]);

        if take < new_samples.len() {
            if !self.truncated {
                log::warn!(
                    "Recording reached {:.0}s limit; later audio is not captured",
                    self.duration_secs()
                );
            }
            self.truncated = true;
            return false;
        }
        true
    }

    /// Whether samples were dropped at the max duration.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    /// Encode as 16-bit PCM WAV
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, VoiceError> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)
                .map_err(|e| VoiceError::Encoding(e.to_string()))?;

            for &sample in &self.samples {
                let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| VoiceError::Encoding(e.to_string()))?;
            }

            writer
                .finalize()
                .map_err(|e| VoiceError::Encoding(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// The platform microphone, if this build supports one.
pub fn default_source() -> Result<Box<dyn AudioSource>, VoiceError> {
    #[cfg(feature = "microphone")]
    {
        Ok(Box::new(microphone::MicrophoneSource::new()))
    }
    #[cfg(not(feature = "microphone"))]
    {
        Err(VoiceError::Unsupported)
    }
}

#[cfg(feature = "microphone")]
pub mod microphone {
    //! cpal-backed microphone source.

    use super::{AudioBuffer, AudioSource, ChunkSink, VoiceError, WAV_MIME_TYPE};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::SampleFormat;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// Longest recording kept in memory; capture stops adding samples past it.
    const MAX_RECORDING_SECS: f32 = 300.0;

    struct CaptureHandle {
        stop_tx: mpsc::Sender<()>,
        thread_handle: JoinHandle<()>,
        buffer: Arc<Mutex<AudioBuffer>>,
        sink: ChunkSink,
    }

    /// Default input device, captured on a dedicated thread (cpal streams are not Send).
    #[derive(Default)]
    pub struct MicrophoneSource {
        capture: Option<CaptureHandle>,
    }

    impl MicrophoneSource {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn map_build_error(e: cpal::BuildStreamError) -> VoiceError {
        let message = e.to_string();
        if message.to_ascii_lowercase().contains("permission") {
            VoiceError::PermissionDenied(message)
        } else {
            VoiceError::StreamBuild(message)
        }
    }

    impl AudioSource for MicrophoneSource {
        fn mime_type(&self) -> &str {
            WAV_MIME_TYPE
        }

        fn open(&mut self, sink: ChunkSink) -> Result<(), VoiceError> {
            self.close();

            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(VoiceError::NoInputDevice)?;
            let config = device
                .default_input_config()
                .map_err(|e| VoiceError::DeviceConfig(e.to_string()))?;

            log::info!(
                "Audio config: {} Hz, {} channels, {:?}",
                config.sample_rate().0,
                config.channels(),
                config.sample_format()
            );

            let buffer = Arc::new(Mutex::new(AudioBuffer::new(
                config.sample_rate().0,
                config.channels(),
                MAX_RECORDING_SECS,
            )));
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<(), VoiceError>>();
            let sample_format = config.sample_format();
            let stream_config: cpal::StreamConfig = config.into();
            let thread_buffer = buffer.clone();

            let thread_handle = thread::spawn(move || {
                run_capture_thread(device, stream_config, sample_format, thread_buffer, stop_rx, ready_tx)
            });

            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let _ = thread_handle.join();
                    return Err(e);
                }
                Err(_) => {
                    let _ = thread_handle.join();
                    return Err(VoiceError::ThreadError(
                        "capture thread exited before starting".to_string(),
                    ));
                }
            }

            self.capture = Some(CaptureHandle {
                stop_tx,
                thread_handle,
                buffer,
                sink,
            });
            Ok(())
        }

        fn close(&mut self) {
            let Some(handle) = self.capture.take() else {
                return;
            };
            let _ = handle.stop_tx.send(());
            let _ = handle.thread_handle.join();

            let encoded = handle
                .buffer
                .lock()
                .map_err(|_| VoiceError::Encoding("Failed to lock buffer".to_string()))
                .and_then(|b| b.to_wav_bytes());
            if handle.buffer.lock().map(|b| b.is_truncated()).unwrap_or(false) {
                log::warn!("Microphone recording was cut at {}s", MAX_RECORDING_SECS);
            }
            match encoded {
                Ok(wav) => handle.sink.push(wav),
                Err(e) => log::error!("Discarding microphone audio: {}", e),
            }
        }
    }

    impl Drop for MicrophoneSource {
        fn drop(&mut self) {
            self.close();
        }
    }

    fn run_capture_thread(
        device: cpal::Device,
        config: cpal::StreamConfig,
        sample_format: SampleFormat,
        buffer: Arc<Mutex<AudioBuffer>>,
        stop_rx: mpsc::Receiver<()>,
        ready_tx: mpsc::Sender<Result<(), VoiceError>>,
    ) {
        use cpal::Sample;

        let err_fn = |err| {
            log::error!("Audio stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.append(data);
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.append(&samples);
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.append(&samples);
                    }
                },
                err_fn,
                None,
            ),
            other => {
                let _ = ready_tx.send(Err(VoiceError::DeviceConfig(format!(
                    "Unsupported sample format: {:?}",
                    other
                ))));
                return;
            }
        };

        let stream = match stream.map_err(map_build_error) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(VoiceError::StreamStart(e.to_string())));
            return;
        }
        let _ = ready_tx.send(Ok(()));

        loop {
            match stop_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(()) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        // Stream is dropped here, stopping capture
    }
}
