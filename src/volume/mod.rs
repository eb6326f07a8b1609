//! Per-channel volume control
//!
//! Every port carries one integer gain per channel, initialized to unity on
//! open. Updates are masked: the caller selects channels with a bitmask and
//! supplies a table of gains indexed by source channel.
//!
//! The two standard-order surround formats present channels to the caller in
//! a different physical order than playback uses internally, so updates to
//! playback channels 4..8 read the caller's table through a fixed remap.
//! Without it a gain meant for a rear speaker would land on a side speaker.

use std::sync::atomic::{AtomicI32, Ordering};

use bitflags::bitflags;

use crate::format::SampleFormat;

/// Unity gain. Freshly opened ports start every channel here.
pub const VOLUME_0DB: i32 = 32768;

bitflags! {
    /// Channel selection mask for volume updates. LSB = channel 0.
    ///
    /// Bits at or beyond the target port's channel count are ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelMask: u32 {
        /// Channel 0 (front left, or the mono channel)
        const CH_0 = 0x01;
        /// Channel 1 (front right)
        const CH_1 = 0x02;
        /// Channel 2
        const CH_2 = 0x04;
        /// Channel 3
        const CH_3 = 0x08;
        /// Channel 4
        const CH_4 = 0x10;
        /// Channel 5
        const CH_5 = 0x20;
        /// Channel 6
        const CH_6 = 0x40;
        /// Channel 7
        const CH_7 = 0x80;
        /// Both stereo channels
        const STEREO = 0x03;
        /// All eight surround channels
        const SURROUND = 0xFF;
    }
}

/// Caller-table index supplying the gain for playback channel `channel`
///
/// Identity for every format except the standard-order surround variants,
/// where the rear and side pairs swap: playback channels 4,5,6,7 read source
/// entries 6,7,4,5. No other layout remaps.
pub fn source_channel_index(format: SampleFormat, channel: usize) -> usize {
    if format.is_standard_order() {
        match channel {
            4 => 6,
            5 => 7,
            6 => 4,
            7 => 5,
            other => other,
        }
    } else {
        channel
    }
}

/// Apply a masked volume update to a port's gain array
///
/// Caller guarantees `volumes.len() >= channels`. Stores are relaxed:
/// concurrent updates to the same port interleave per channel, which is the
/// accepted behavior for racing volume writers.
pub(crate) fn apply(
    format: SampleFormat,
    channels: usize,
    mask: ChannelMask,
    volumes: &[i32],
    gains: &[AtomicI32],
) {
    for i in 0..channels {
        if mask.bits() & (1 << i) != 0 {
            let source = source_channel_index(format, i);
            gains[i].store(volumes[source], Ordering::Relaxed);
        }
    }
}
