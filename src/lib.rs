//! Virtual audio output multiplexer
//!
//! A fixed-capacity multiplexer that exposes a small set of abstract audio
//! "ports", each one an independent logical PCM stream produced by a guest
//! application, and maps every port onto one real output stream of a host
//! audio backend.
//!
//! # Features
//! - Fixed-capacity port table with first-fit allocation and 1-based handles
//! - Sample format resolution for mono, stereo and 8-channel surround layouts
//!   in 16-bit integer and 32-bit float encodings
//! - Per-channel volume control, including the standard-order surround remap
//! - Blocking backpressure on output so a producer cannot outrun playback
//! - Pluggable stream backends: real-time playback and WAV capture
//!
//! # Crate feature flags
//! - `streaming` (opt-in): real-time playback backend (enables the optional
//!   `rodio` dep)
//!
//! # Quick start
//! ## Capture port audio to WAV files
//! ```no_run
//! use audiomux::{AudioOut, AudioOutConfig, SampleFormat, WavBackend};
//! let backend = WavBackend::new("captures").unwrap();
//! let mux = AudioOut::new(backend, AudioOutConfig::default());
//! let handle = mux.open(0, 256, 48_000, SampleFormat::S16Stereo).unwrap();
//! let buffer = vec![0u8; mux.status(handle).unwrap().buffer_bytes];
//! mux.output(handle, Some(&buffer)).unwrap();
//! mux.close(handle).unwrap();
//! ```
//!
//! ## Real-time playback
//! ```no_run
//! # #[cfg(feature = "streaming")]
//! # {
//! use audiomux::{AudioOut, AudioOutConfig, RodioBackend, SampleFormat};
//! let backend = RodioBackend::new().unwrap();
//! let mux = AudioOut::new(backend, AudioOutConfig::default());
//! let handle = mux.open(0, 512, 48_000, SampleFormat::FloatStereo).unwrap();
//! // submit buffers of exactly 512 frames per output() call
//! # }
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod backend; // Stream backend capability and implementations
pub mod format; // Sample format resolution
pub mod ports; // Port table and public operations
pub mod volume; // Per-channel volume control

/// Error types for multiplexer operations
#[derive(thiserror::Error, Debug)]
pub enum AudiomuxError {
    /// Every slot in the port table is in use
    #[error("all audio ports are in use")]
    PortsExhausted,

    /// The backend could not open an output stream
    #[error("failed to open backend stream: {0}")]
    BackendOpen(String),

    /// Handle out of range, or the slot it addresses is not open
    #[error("invalid audio port handle {0}")]
    InvalidPort(i32),

    /// Raw format code from the guest does not name a known format
    #[error("unrecognized sample format code {0}")]
    InvalidFormat(u32),

    /// Submitted buffer does not match the size derived from port metadata
    #[error("output buffer is {actual} bytes, port expects {expected}")]
    BufferSize {
        /// Byte length the port expects per output call
        expected: usize,
        /// Byte length the caller submitted
        actual: usize,
    },

    /// Volume table shorter than the port's channel count
    #[error("volume table has {got} entries, port needs {needed}")]
    VolumeTable {
        /// Entries the port's channel count requires
        needed: usize,
        /// Entries the caller supplied
        got: usize,
    },

    /// The backend did not accept the submitted samples
    #[error("backend rejected submitted samples")]
    OutputRejected,

    /// Error writing a capture file
    #[error("audio file write error: {0}")]
    AudioFile(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for multiplexer operations
pub type Result<T> = std::result::Result<T, AudiomuxError>;

// Public API exports
#[cfg(feature = "streaming")]
pub use backend::playback::RodioBackend;
pub use backend::ring_buffer::RingBuffer;
pub use backend::wav::WavBackend;
pub use backend::{StreamBackend, BUFFER_THRESHOLD};
pub use format::{FormatSpec, SampleFormat, WireFormat, MAX_CHANNELS};
pub use ports::{AudioOut, AudioOutConfig, PortStatus, DEFAULT_PORT_CAPACITY};
pub use volume::{source_channel_index, ChannelMask, VOLUME_0DB};
