//! WAV capture backend
//!
//! Writes every stream's audio to its own WAV file instead of playing it.
//! Useful for dumping what a guest application sends to its ports, and for
//! exercising the multiplexer on machines without an audio device.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use hound::{SampleFormat as WavSampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use super::StreamBackend;
use crate::format::WireFormat;
use crate::{AudiomuxError, Result};

/// One capture file in progress
pub struct WavStream {
    writer: Mutex<WavWriter<BufWriter<File>>>,
    wire: WireFormat,
    /// Capture file location, exposed for callers that post-process dumps
    pub path: PathBuf,
}

/// Capture backend writing one WAV file per opened stream
///
/// Files are numbered `port-00.wav`, `port-01.wav`, ... in the order streams
/// are opened, inside the directory given at construction.
pub struct WavBackend {
    dir: PathBuf,
    next_index: AtomicUsize,
}

impl WavBackend {
    /// Create a capture backend writing into `dir`, creating it if missing
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(WavBackend {
            dir,
            next_index: AtomicUsize::new(0),
        })
    }
}

impl StreamBackend for WavBackend {
    type Stream = WavStream;

    fn open_stream(&self, wire: WireFormat, channels: u16, frequency: u32) -> Result<WavStream> {
        let spec = match wire {
            WireFormat::S16Le => WavSpec {
                channels,
                sample_rate: frequency,
                bits_per_sample: 16,
                sample_format: WavSampleFormat::Int,
            },
            WireFormat::F32Le => WavSpec {
                channels,
                sample_rate: frequency,
                bits_per_sample: 32,
                sample_format: WavSampleFormat::Float,
            },
        };

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("port-{index:02}.wav"));
        let writer =
            WavWriter::create(&path, spec).map_err(|e| AudiomuxError::AudioFile(e.to_string()))?;

        Ok(WavStream {
            writer: Mutex::new(writer),
            wire,
            path,
        })
    }

    fn resume(&self, _stream: &WavStream) {
        // Capture starts with the first pushed buffer; nothing to resume.
    }

    fn push(&self, stream: &WavStream, bytes: &[u8]) -> bool {
        let mut writer = stream.writer.lock();
        match stream.wire {
            WireFormat::S16Le => {
                for chunk in bytes.chunks_exact(2) {
                    let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                    if writer.write_sample(sample).is_err() {
                        return false;
                    }
                }
            }
            WireFormat::F32Le => {
                for chunk in bytes.chunks_exact(4) {
                    let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    if writer.write_sample(sample).is_err() {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn buffered_bytes(&self, _stream: &WavStream) -> usize {
        // A file drains instantly, so capture never exerts backpressure.
        0
    }

    fn close(&self, stream: WavStream) -> Result<()> {
        stream
            .writer
            .into_inner()
            .finalize()
            .map_err(|e| AudiomuxError::AudioFile(e.to_string()))
    }
}
