//! Real-time playback backend using rodio
//!
//! One shared output stream drives the host device. Every multiplexer port
//! gets its own `Sink` fed from a private ring buffer, so ports play
//! independently and unplayed bytes are accounted per stream for the
//! backpressure loop.

use std::sync::Arc;
use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use super::ring_buffer::RingBuffer;
use super::StreamBackend;
use crate::format::WireFormat;
use crate::{AudiomuxError, Result};

/// Per-stream ring capacity in samples, comfortably above the backpressure
/// threshold so a full high-water mark plus one submitted buffer always fits
const STREAM_RING_SAMPLES: usize = 1 << 17;

/// Samples the playback source reads from the ring per batch
const SOURCE_BATCH: usize = 4096;

/// Producer backoff while the stream ring is momentarily full
const RING_BACKOFF_MICROS: u64 = 100;

/// Retries before a ring write is abandoned (~100ms at the backoff above)
const RING_MAX_RETRIES: u32 = 1000;

/// One open playback stream: a paused sink draining a ring buffer
pub struct RodioStream {
    buffer: Arc<RingBuffer>,
    sink: Sink,
    wire: WireFormat,
}

/// Real-time playback backend built on rodio
pub struct RodioBackend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

// The cpal stream inside `OutputStream` is not Send/Sync on every platform.
// This backend never touches it after construction: all playback control goes
// through `OutputStreamHandle` and the per-stream `Sink`s, both thread-safe.
// The field exists only to keep the device alive.
unsafe impl Send for RodioBackend {}
unsafe impl Sync for RodioBackend {}

impl RodioBackend {
    /// Open the default host output device
    pub fn new() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AudiomuxError::BackendOpen(format!("no output device: {e}")))?;

        Ok(RodioBackend {
            _stream: stream,
            handle,
        })
    }
}

impl StreamBackend for RodioBackend {
    type Stream = RodioStream;

    fn open_stream(&self, wire: WireFormat, channels: u16, frequency: u32) -> Result<RodioStream> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AudiomuxError::BackendOpen(format!("cannot create sink: {e}")))?;

        let buffer = Arc::new(RingBuffer::new(STREAM_RING_SAMPLES)?);
        let source = RingSource::new(Arc::clone(&buffer), channels, frequency);

        sink.append(source);
        sink.pause();

        Ok(RodioStream { buffer, sink, wire })
    }

    fn resume(&self, stream: &RodioStream) {
        stream.sink.play();
    }

    fn push(&self, stream: &RodioStream, bytes: &[u8]) -> bool {
        let mut samples = Vec::with_capacity(bytes.len() / stream.wire.bytes_per_sample());
        decode_wire(stream.wire, bytes, &mut samples);

        // Blocking write with bounded retries. The ring outsizes the
        // backpressure threshold, so retries only trigger on pathological
        // buffer sizes.
        let mut remaining = samples.as_slice();
        let mut retries = 0;
        while !remaining.is_empty() && retries < RING_MAX_RETRIES {
            let written = stream.buffer.write(remaining);
            if written == 0 {
                std::thread::sleep(Duration::from_micros(RING_BACKOFF_MICROS));
                retries += 1;
            } else {
                remaining = &remaining[written..];
                retries = 0;
            }
        }

        remaining.is_empty()
    }

    fn buffered_bytes(&self, stream: &RodioStream) -> usize {
        stream.buffer.available_read() * stream.wire.bytes_per_sample()
    }

    fn close(&self, stream: RodioStream) -> Result<()> {
        stream.sink.stop();
        Ok(())
    }
}

/// Infinite source feeding a sink from the stream's ring buffer
///
/// Reads in batches to keep lock traffic low and emits silence on underrun
/// so the sink stays alive between submissions.
struct RingSource {
    buffer: Arc<RingBuffer>,
    channels: u16,
    sample_rate: u32,
    batch: Vec<f32>,
    batch_pos: usize,
}

impl RingSource {
    fn new(buffer: Arc<RingBuffer>, channels: u16, sample_rate: u32) -> Self {
        RingSource {
            buffer,
            channels,
            sample_rate,
            batch: vec![0.0; SOURCE_BATCH],
            batch_pos: SOURCE_BATCH, // force a refill on first pull
        }
    }
}

impl Iterator for RingSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.batch_pos >= self.batch.len() {
            let read = self.buffer.read(&mut self.batch);
            if read < self.batch.len() {
                // Underrun: pad the rest of the batch with silence
                self.batch[read..].fill(0.0);
            }
            self.batch_pos = 0;
        }

        let sample = self.batch[self.batch_pos];
        self.batch_pos += 1;
        Some(sample)
    }
}

impl Source for RingSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Decode interleaved wire bytes into f32 samples
///
/// S16 samples are scaled to [-1.0, 1.0); trailing bytes that do not fill a
/// whole sample are dropped.
pub(crate) fn decode_wire(wire: WireFormat, bytes: &[u8], out: &mut Vec<f32>) {
    match wire {
        WireFormat::S16Le => {
            for chunk in bytes.chunks_exact(2) {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                out.push(sample as f32 / 32768.0);
            }
        }
        WireFormat::F32Le => {
            for chunk in bytes.chunks_exact(4) {
                out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
    }
}
