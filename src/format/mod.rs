//! Sample format resolution
//!
//! A guest describes a port with one of eight format codes combining channel
//! layout (mono, stereo, 8-channel surround) with sample encoding (16-bit
//! signed integer or 32-bit float). Two extra surround variants use the
//! "standard" channel order, which only matters for volume updates; their
//! channel count and sample size match the plain surround variants.
//!
//! Resolution to channel count, sample size and host wire format is a pure
//! table lookup with no failure path: raw guest codes are rejected at the
//! boundary by [`SampleFormat::from_code`], and everything past that point
//! works on the closed enum.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::{AudiomuxError, Result};

/// Most channels any recognized format carries
pub const MAX_CHANNELS: usize = 8;

/// Sample format and channel layout of a port
///
/// Discriminants match the format codes guest applications pass to the
/// open call, so conversion from the wire is a straight cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum SampleFormat {
    /// 16-bit signed integer, 1 channel
    S16Mono = 0,
    /// 16-bit signed integer, 2 channels
    S16Stereo = 1,
    /// 16-bit signed integer, 8 channels
    S16Surround = 2,
    /// 32-bit float, 1 channel
    FloatMono = 3,
    /// 32-bit float, 2 channels
    FloatStereo = 4,
    /// 32-bit float, 8 channels
    FloatSurround = 5,
    /// 16-bit signed integer, 8 channels in standard order
    S16SurroundStd = 6,
    /// 32-bit float, 8 channels in standard order
    FloatSurroundStd = 7,
}

/// Wire format a backend stream is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Interleaved 16-bit signed little-endian integer samples
    S16Le,
    /// Interleaved 32-bit little-endian float samples
    F32Le,
}

impl WireFormat {
    /// Bytes one sample occupies on the wire
    pub fn bytes_per_sample(self) -> usize {
        match self {
            WireFormat::S16Le => 2,
            WireFormat::F32Le => 4,
        }
    }
}

/// Concrete stream parameters resolved from a [`SampleFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    /// Interleaved channels per frame
    pub channels: u16,
    /// Bytes per sample
    pub sample_size: u16,
    /// Wire format the backend stream uses
    pub wire: WireFormat,
}

impl SampleFormat {
    /// Convert a raw guest format code
    ///
    /// Codes outside the recognized set are rejected here so the rest of the
    /// crate never sees them.
    pub fn from_code(code: u32) -> Result<Self> {
        Self::from_u32(code).ok_or(AudiomuxError::InvalidFormat(code))
    }

    /// Resolve channel count, sample size and wire format
    pub fn spec(self) -> FormatSpec {
        use SampleFormat::*;
        match self {
            S16Mono => FormatSpec {
                channels: 1,
                sample_size: 2,
                wire: WireFormat::S16Le,
            },
            S16Stereo => FormatSpec {
                channels: 2,
                sample_size: 2,
                wire: WireFormat::S16Le,
            },
            S16Surround | S16SurroundStd => FormatSpec {
                channels: 8,
                sample_size: 2,
                wire: WireFormat::S16Le,
            },
            FloatMono => FormatSpec {
                channels: 1,
                sample_size: 4,
                wire: WireFormat::F32Le,
            },
            FloatStereo => FormatSpec {
                channels: 2,
                sample_size: 4,
                wire: WireFormat::F32Le,
            },
            FloatSurround | FloatSurroundStd => FormatSpec {
                channels: 8,
                sample_size: 4,
                wire: WireFormat::F32Le,
            },
        }
    }

    /// Whether this is one of the standard-order surround formats
    ///
    /// Standard order presents the rear and side channel pairs swapped
    /// relative to the playback order used internally. Volume updates remap
    /// through [`crate::volume::source_channel_index`]; nothing else cares.
    pub fn is_standard_order(self) -> bool {
        matches!(
            self,
            SampleFormat::S16SurroundStd | SampleFormat::FloatSurroundStd
        )
    }
}
