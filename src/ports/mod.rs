//! Port table and public operations
//!
//! The multiplexer owns a fixed-capacity table of port slots guarded by one
//! reader-writer lock. Opening a port allocates the first free slot, resolves
//! the guest's sample format, opens a backend stream and starts playback;
//! the returned handle is the slot index plus one.
//!
//! Handles are caller-controlled raw integers. Slots are reused, so a stale
//! handle can silently address a newer, unrelated port; every operation
//! therefore revalidates the handle against the current occupant instead of
//! assuming anything about it. Handle 0 and negatives never validate.
//!
//! Locking follows the allocator/reader split: [`AudioOut::open`] and
//! [`AudioOut::close`] take the write lock, everything else takes the read
//! lock. Per-channel gains are atomics, so concurrent volume updates under
//! the read lock stay race-free while the hot path never takes the write
//! lock.

use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::{StreamBackend, BUFFER_THRESHOLD};
use crate::format::{SampleFormat, MAX_CHANNELS};
use crate::volume::{self, ChannelMask, VOLUME_0DB};
use crate::{AudiomuxError, Result};

/// Default number of concurrent ports
pub const DEFAULT_PORT_CAPACITY: usize = 8;

/// Multiplexer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutConfig {
    /// Slots in the port table; also the largest valid handle
    pub capacity: usize,
    /// Unplayed bytes a stream may hold before `output` blocks the producer
    pub buffer_threshold: usize,
}

impl Default for AudioOutConfig {
    fn default() -> Self {
        AudioOutConfig {
            capacity: DEFAULT_PORT_CAPACITY,
            buffer_threshold: BUFFER_THRESHOLD,
        }
    }
}

impl AudioOutConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AudiomuxError::Config(e.to_string()))
    }
}

/// Status snapshot of an open port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    /// Caller-supplied classification, not interpreted by the multiplexer
    pub port_type: i32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Bytes per sample
    pub sample_size: u16,
    /// Sample rate in Hz
    pub frequency: u32,
    /// Frames the caller submits per output call
    pub samples_per_buffer: u32,
    /// Exact byte length every output buffer must have
    pub buffer_bytes: usize,
    /// Format the port was opened with
    pub format: SampleFormat,
}

/// One occupied slot. A free slot is `None`; occupancy is the only authority
/// on whether a handle is live.
struct Port<S> {
    port_type: i32,
    samples_per_buffer: u32,
    frequency: u32,
    format: SampleFormat,
    channels: u16,
    sample_size: u16,
    volume: [AtomicI32; MAX_CHANNELS],
    stream: S,
}

impl<S> Port<S> {
    /// Bytes one output call must carry, derived from port metadata only
    fn buffer_bytes(&self) -> usize {
        self.samples_per_buffer as usize * self.sample_size as usize * self.channels as usize
    }
}

/// The virtual audio output multiplexer
///
/// Owns the backend and the port table. All operations take `&self`; the
/// service is shared between producer threads behind an `Arc` or a borrow.
pub struct AudioOut<B: StreamBackend> {
    backend: B,
    config: AudioOutConfig,
    ports: RwLock<Box<[Option<Port<B::Stream>>]>>,
}

impl<B: StreamBackend> AudioOut<B> {
    /// Create a multiplexer with every slot free
    pub fn new(backend: B, config: AudioOutConfig) -> Self {
        let ports = (0..config.capacity)
            .map(|_| None)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        AudioOut {
            backend,
            config,
            ports: RwLock::new(ports),
        }
    }

    /// Number of slots in the port table
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Whether `handle` addresses a slot at all. Liveness is checked
    /// separately against the current occupant.
    fn is_valid_handle(&self, handle: i32) -> bool {
        handle >= 1 && (handle as usize) <= self.config.capacity
    }

    /// Open a port and start playback on its backend stream
    ///
    /// Scans for the lowest free slot. `port_type` is opaque to the
    /// multiplexer; `samples_per_buffer` and `frequency` are passed through
    /// to the backend untouched. Every channel's gain starts at
    /// [`VOLUME_0DB`]. Returns the 1-based handle.
    ///
    /// Fails with [`AudiomuxError::PortsExhausted`] when no slot is free and
    /// with [`AudiomuxError::BackendOpen`] when the backend cannot open a
    /// stream; in both cases the table is left unchanged.
    pub fn open(
        &self,
        port_type: i32,
        samples_per_buffer: u32,
        frequency: u32,
        format: SampleFormat,
    ) -> Result<i32> {
        let spec = format.spec();
        let mut ports = self.ports.write();

        let Some(index) = ports.iter().position(Option::is_none) else {
            return Err(AudiomuxError::PortsExhausted);
        };

        // Open the stream before touching the slot, so a backend failure
        // cannot leak a half-initialized port.
        let stream = self.backend.open_stream(spec.wire, spec.channels, frequency)?;
        self.backend.resume(&stream);

        ports[index] = Some(Port {
            port_type,
            samples_per_buffer,
            frequency,
            format,
            channels: spec.channels,
            sample_size: spec.sample_size,
            volume: std::array::from_fn(|_| AtomicI32::new(VOLUME_0DB)),
            stream,
        });

        Ok(index as i32 + 1)
    }

    /// Submit one buffer of PCM data and block until the stream drains
    ///
    /// `None` data succeeds without contacting the backend. The buffer must
    /// hold exactly `samples_per_buffer * sample_size * channels` bytes, a
    /// size derived from port metadata alone and discoverable through
    /// [`status`](Self::status).
    ///
    /// After submission the call busy-polls, yielding each iteration, until
    /// the backend's unplayed byte count falls to the configured threshold.
    /// Latency is therefore bounded by backend drain rate; there is no
    /// timeout and no cancellation. Callers serialize their own submissions
    /// per handle; concurrent calls on the same handle interleave at the
    /// backend with undefined results.
    pub fn output(&self, handle: i32, data: Option<&[u8]>) -> Result<()> {
        if !self.is_valid_handle(handle) {
            return Err(AudiomuxError::InvalidPort(handle));
        }
        let Some(data) = data else {
            return Ok(()); // nothing to output
        };

        let ports = self.ports.read();
        let Some(port) = ports[handle as usize - 1].as_ref() else {
            return Err(AudiomuxError::InvalidPort(handle));
        };

        let expected = port.buffer_bytes();
        if data.len() != expected {
            return Err(AudiomuxError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let accepted = self.backend.push(&port.stream, data);

        while self.backend.buffered_bytes(&port.stream) > self.config.buffer_threshold {
            std::thread::yield_now();
        }

        if accepted {
            Ok(())
        } else {
            Err(AudiomuxError::OutputRejected)
        }
    }

    /// Update the gains of the channels selected by `mask`
    ///
    /// `volumes` is indexed by source channel and must cover the port's
    /// channel count. For the standard-order surround formats the rear and
    /// side pairs are remapped so each gain lands on the channel the caller
    /// meant. Mask bits at or beyond the channel count are ignored. The
    /// update has no partial-failure state.
    pub fn set_volume(&self, handle: i32, mask: ChannelMask, volumes: &[i32]) -> Result<()> {
        if !self.is_valid_handle(handle) {
            return Err(AudiomuxError::InvalidPort(handle));
        }

        let ports = self.ports.read();
        let Some(port) = ports[handle as usize - 1].as_ref() else {
            return Err(AudiomuxError::InvalidPort(handle));
        };

        let channels = port.channels as usize;
        if volumes.len() < channels {
            return Err(AudiomuxError::VolumeTable {
                needed: channels,
                got: volumes.len(),
            });
        }

        volume::apply(port.format, channels, mask, volumes, &port.volume);
        Ok(())
    }

    /// Snapshot an open port's metadata
    pub fn status(&self, handle: i32) -> Result<PortStatus> {
        if !self.is_valid_handle(handle) {
            return Err(AudiomuxError::InvalidPort(handle));
        }

        let ports = self.ports.read();
        let Some(port) = ports[handle as usize - 1].as_ref() else {
            return Err(AudiomuxError::InvalidPort(handle));
        };

        Ok(PortStatus {
            port_type: port.port_type,
            channels: port.channels,
            sample_size: port.sample_size,
            frequency: port.frequency,
            samples_per_buffer: port.samples_per_buffer,
            buffer_bytes: port.buffer_bytes(),
            format: port.format,
        })
    }

    /// Current gain of every channel, in playback order
    pub fn channel_volumes(&self, handle: i32) -> Result<Vec<i32>> {
        if !self.is_valid_handle(handle) {
            return Err(AudiomuxError::InvalidPort(handle));
        }

        let ports = self.ports.read();
        let Some(port) = ports[handle as usize - 1].as_ref() else {
            return Err(AudiomuxError::InvalidPort(handle));
        };

        Ok(port.volume[..port.channels as usize]
            .iter()
            .map(|g| g.load(Ordering::Relaxed))
            .collect())
    }

    /// Close a port, releasing its slot and backend stream
    ///
    /// The slot becomes free for reuse; a later open may hand the same
    /// handle value to an unrelated port.
    pub fn close(&self, handle: i32) -> Result<()> {
        if !self.is_valid_handle(handle) {
            return Err(AudiomuxError::InvalidPort(handle));
        }

        let mut ports = self.ports.write();
        let Some(port) = ports[handle as usize - 1].take() else {
            return Err(AudiomuxError::InvalidPort(handle));
        };
        drop(ports);

        self.backend.close(port.stream)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::format::WireFormat;

    fn mux_with_capacity(capacity: usize) -> AudioOut<MockBackend> {
        AudioOut::new(
            MockBackend::new(),
            AudioOutConfig {
                capacity,
                ..AudioOutConfig::default()
            },
        )
    }

    #[test]
    fn test_capacity_invariant() {
        let mux = mux_with_capacity(4);

        let handles: Vec<i32> = (0..4)
            .map(|_| mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap())
            .collect();
        assert_eq!(handles, vec![1, 2, 3, 4]);

        assert!(matches!(
            mux.open(0, 256, 48_000, SampleFormat::S16Stereo),
            Err(AudiomuxError::PortsExhausted)
        ));
    }

    #[test]
    fn test_open_resolves_format_and_resumes() {
        let mux = mux_with_capacity(2);
        mux.open(7, 512, 44_100, SampleFormat::FloatSurround).unwrap();

        let opened = mux.backend.opened.lock().clone();
        assert_eq!(opened, vec![(WireFormat::F32Le, 8, 44_100)]);
        assert!(mux.backend.stream(0).resumed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_handle_validity_bounds() {
        let mux = mux_with_capacity(2);
        let handle = mux.open(0, 128, 48_000, SampleFormat::S16Mono).unwrap();
        assert_eq!(handle, 1);

        for bad in [0, -1, i32::MIN, 3, i32::MAX] {
            assert!(matches!(
                mux.status(bad),
                Err(AudiomuxError::InvalidPort(h)) if h == bad
            ));
        }

        // In range but never opened
        assert!(mux.status(2).is_err());
    }

    #[test]
    fn test_open_failure_leaves_slot_free() {
        let mux = mux_with_capacity(1);
        mux.backend.fail_open.store(true, Ordering::Relaxed);

        assert!(matches!(
            mux.open(0, 256, 48_000, SampleFormat::S16Stereo),
            Err(AudiomuxError::BackendOpen(_))
        ));

        // The failed attempt must not have consumed the only slot
        mux.backend.fail_open.store(false, Ordering::Relaxed);
        assert_eq!(mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap(), 1);
    }

    #[test]
    fn test_output_none_is_a_noop() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap();

        mux.output(handle, None).unwrap();

        assert_eq!(mux.backend.stream(0).pushes.lock().len(), 0);
        assert_eq!(mux.backend.stream(0).polls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_output_submits_exact_buffer() {
        let mux = mux_with_capacity(1);
        // 256 frames * 2 bytes * 2 channels
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap();

        let data = vec![0u8; 1024];
        mux.output(handle, Some(&data)).unwrap();

        assert_eq!(mux.backend.stream(0).pushed_bytes(), 1024);
    }

    #[test]
    fn test_output_rejects_wrong_size() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap();

        let err = mux.output(handle, Some(&[0u8; 100])).unwrap_err();
        assert!(matches!(
            err,
            AudiomuxError::BufferSize {
                expected: 1024,
                actual: 100
            }
        ));
        assert_eq!(mux.backend.stream(0).pushes.lock().len(), 0);
    }

    #[test]
    fn test_output_blocks_until_drained() {
        let mux = AudioOut::new(
            MockBackend::draining(64),
            AudioOutConfig {
                capacity: 1,
                buffer_threshold: 128,
            },
        );
        let handle = mux.open(0, 128, 48_000, SampleFormat::S16Mono).unwrap();

        // 256 bytes buffered, 128 threshold, 64 drained per poll
        mux.output(handle, Some(&[0u8; 256])).unwrap();

        let polls = mux.backend.stream(0).polls.load(Ordering::Relaxed);
        assert!(polls >= 2, "expected several drain polls, saw {polls}");
    }

    #[test]
    fn test_output_reports_backend_rejection() {
        let mux = mux_with_capacity(1);
        mux.backend.reject_push.store(true, Ordering::Relaxed);
        let handle = mux.open(0, 64, 48_000, SampleFormat::S16Mono).unwrap();

        assert!(matches!(
            mux.output(handle, Some(&[0u8; 128])),
            Err(AudiomuxError::OutputRejected)
        ));
    }

    #[test]
    fn test_default_volume_is_unity() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::FloatSurround).unwrap();

        assert_eq!(mux.channel_volumes(handle).unwrap(), vec![VOLUME_0DB; 8]);
    }

    #[test]
    fn test_set_volume_standard_order_remap() {
        let mux = mux_with_capacity(2);
        let std_port = mux.open(0, 256, 48_000, SampleFormat::S16SurroundStd).unwrap();
        let plain_port = mux.open(0, 256, 48_000, SampleFormat::S16Surround).unwrap();

        let mask = ChannelMask::from_bits_retain(0b1111_0000);
        let volumes = [0, 0, 0, 0, 100, 200, 300, 400];

        mux.set_volume(std_port, mask, &volumes).unwrap();
        mux.set_volume(plain_port, mask, &volumes).unwrap();

        let std_gains = mux.channel_volumes(std_port).unwrap();
        assert_eq!(&std_gains[..4], &[VOLUME_0DB; 4]);
        assert_eq!(&std_gains[4..], &[300, 400, 100, 200]);

        let plain_gains = mux.channel_volumes(plain_port).unwrap();
        assert_eq!(&plain_gains[4..], &[100, 200, 300, 400]);
    }

    #[test]
    fn test_set_volume_rejects_short_table() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Surround).unwrap();

        assert!(matches!(
            mux.set_volume(handle, ChannelMask::SURROUND, &[0; 4]),
            Err(AudiomuxError::VolumeTable { needed: 8, got: 4 })
        ));
    }

    #[test]
    fn test_set_volume_ignores_excess_mask_bits() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap();

        // Stereo table is long enough even though the mask names 8 channels
        mux.set_volume(handle, ChannelMask::SURROUND, &[5, 6]).unwrap();
        assert_eq!(mux.channel_volumes(handle).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_status_reports_port_metadata() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(42, 512, 44_100, SampleFormat::FloatStereo).unwrap();

        let status = mux.status(handle).unwrap();
        assert_eq!(status.port_type, 42);
        assert_eq!(status.channels, 2);
        assert_eq!(status.sample_size, 4);
        assert_eq!(status.frequency, 44_100);
        assert_eq!(status.samples_per_buffer, 512);
        assert_eq!(status.buffer_bytes, 512 * 4 * 2);
        assert_eq!(status.format, SampleFormat::FloatStereo);
    }

    #[test]
    fn test_close_releases_stream_and_slot() {
        let mux = mux_with_capacity(1);
        let handle = mux.open(0, 256, 48_000, SampleFormat::S16Mono).unwrap();

        mux.close(handle).unwrap();
        assert_eq!(mux.backend.closed.load(Ordering::Relaxed), 1);
        assert!(mux.status(handle).is_err());

        // Closing twice fails like any other dead handle
        assert!(matches!(
            mux.close(handle),
            Err(AudiomuxError::InvalidPort(1))
        ));
    }

    #[test]
    fn test_slot_reuse_validates_against_current_occupant() {
        let mux = mux_with_capacity(2);
        let first = mux.open(1, 256, 48_000, SampleFormat::S16Stereo).unwrap();
        mux.close(first).unwrap();

        // First-fit hands the same handle to an unrelated port
        let second = mux.open(2, 128, 44_100, SampleFormat::FloatMono).unwrap();
        assert_eq!(second, first);

        // The stale handle now observes the new occupant, not the old port
        let status = mux.status(first).unwrap();
        assert_eq!(status.port_type, 2);
        assert_eq!(status.channels, 1);
    }

    #[test]
    fn test_first_fit_prefers_lowest_slot() {
        let mux = mux_with_capacity(3);
        let h1 = mux.open(0, 256, 48_000, SampleFormat::S16Mono).unwrap();
        let _h2 = mux.open(0, 256, 48_000, SampleFormat::S16Mono).unwrap();
        let _h3 = mux.open(0, 256, 48_000, SampleFormat::S16Mono).unwrap();

        mux.close(h1).unwrap();
        assert_eq!(mux.open(0, 256, 48_000, SampleFormat::S16Mono).unwrap(), h1);
    }

    #[test]
    fn test_config_from_json() {
        let config =
            AudioOutConfig::from_json(r#"{"capacity": 16, "buffer_threshold": 4096}"#).unwrap();
        assert_eq!(config.capacity, 16);
        assert_eq!(config.buffer_threshold, 4096);

        assert!(matches!(
            AudioOutConfig::from_json("not json"),
            Err(AudiomuxError::Config(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = AudioOutConfig::default();
        assert_eq!(config.capacity, DEFAULT_PORT_CAPACITY);
        assert_eq!(config.buffer_threshold, BUFFER_THRESHOLD);
    }
}
