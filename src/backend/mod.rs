//! Stream backend capability and implementations
//!
//! The multiplexer never talks to audio hardware itself. Everything it needs
//! from the host is expressed by [`StreamBackend`]: open a stream for a
//! resolved wire format, resume playback, push PCM bytes, report how many
//! pushed bytes have not played yet, and release the stream again.
//!
//! Two implementations ship with the crate: [`playback::RodioBackend`]
//! (feature `streaming`) plays ports on the host audio device, and
//! [`wav::WavBackend`] captures each port to a WAV file.

#[cfg(feature = "streaming")]
pub mod playback;
pub mod ring_buffer;
pub mod wav;

use crate::format::WireFormat;

/// Bytes a stream may hold unplayed before output blocks the producer
pub const BUFFER_THRESHOLD: usize = 65536;

/// Default sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Host audio capability consumed by [`crate::AudioOut`]
///
/// Streams opened through one backend are independent. Pushing to one never
/// affects another, so the multiplexer drives different streams from
/// different threads through a shared backend reference.
pub trait StreamBackend {
    /// Backend resource representing one open output stream
    type Stream: Send + Sync;

    /// Open a stream playing `channels`-channel audio in `wire` format at
    /// `frequency` Hz. The stream starts paused; playback begins on
    /// [`resume`](Self::resume).
    fn open_stream(
        &self,
        wire: WireFormat,
        channels: u16,
        frequency: u32,
    ) -> crate::Result<Self::Stream>;

    /// Begin (or continue) playback on a stream
    fn resume(&self, stream: &Self::Stream);

    /// Submit wire-format bytes. Returns whether the backend accepted them.
    fn push(&self, stream: &Self::Stream, bytes: &[u8]) -> bool;

    /// Bytes submitted but not yet played
    fn buffered_bytes(&self, stream: &Self::Stream) -> usize;

    /// Release a stream and its resources
    fn close(&self, stream: Self::Stream) -> crate::Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable backend for unit tests
    //!
    //! Records every call, reports a buffered-byte count that drains by a
    //! fixed step per query, and injects open/push failures on demand.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::StreamBackend;
    use crate::format::WireFormat;
    use crate::AudiomuxError;

    pub(crate) struct MockStream {
        pub pushes: Mutex<Vec<Vec<u8>>>,
        pub resumed: AtomicBool,
        /// Times the service polled the buffered-byte count
        pub polls: AtomicUsize,
        buffered: AtomicUsize,
        drain_step: usize,
        reject_push: bool,
    }

    impl MockStream {
        pub fn pushed_bytes(&self) -> usize {
            self.pushes.lock().iter().map(Vec::len).sum()
        }
    }

    #[derive(Default)]
    pub(crate) struct MockBackend {
        /// Parameters of every open_stream call, in order
        pub opened: Mutex<Vec<(WireFormat, u16, u32)>>,
        /// Streams handed out, so tests can inspect them after the fact
        pub streams: Mutex<Vec<Arc<MockStream>>>,
        pub closed: AtomicUsize,
        pub fail_open: AtomicBool,
        pub reject_push: AtomicBool,
        /// Bytes "played" per buffered_bytes query; zero means instant drain
        pub drain_step: AtomicUsize,
    }

    impl MockBackend {
        pub fn new() -> Self {
            let backend = Self::default();
            backend.drain_step.store(usize::MAX, Ordering::Relaxed);
            backend
        }

        /// Backend whose streams drain `step` bytes per poll
        pub fn draining(step: usize) -> Self {
            let backend = Self::new();
            backend.drain_step.store(step, Ordering::Relaxed);
            backend
        }

        pub fn stream(&self, index: usize) -> Arc<MockStream> {
            Arc::clone(&self.streams.lock()[index])
        }
    }

    impl StreamBackend for MockBackend {
        type Stream = Arc<MockStream>;

        fn open_stream(
            &self,
            wire: WireFormat,
            channels: u16,
            frequency: u32,
        ) -> crate::Result<Self::Stream> {
            if self.fail_open.load(Ordering::Relaxed) {
                return Err(AudiomuxError::BackendOpen("mock open failure".into()));
            }
            self.opened.lock().push((wire, channels, frequency));
            let stream = Arc::new(MockStream {
                pushes: Mutex::new(Vec::new()),
                resumed: AtomicBool::new(false),
                polls: AtomicUsize::new(0),
                buffered: AtomicUsize::new(0),
                drain_step: self.drain_step.load(Ordering::Relaxed),
                reject_push: self.reject_push.load(Ordering::Relaxed),
            });
            self.streams.lock().push(Arc::clone(&stream));
            Ok(stream)
        }

        fn resume(&self, stream: &Self::Stream) {
            stream.resumed.store(true, Ordering::Relaxed);
        }

        fn push(&self, stream: &Self::Stream, bytes: &[u8]) -> bool {
            stream.pushes.lock().push(bytes.to_vec());
            if stream.reject_push {
                return false;
            }
            stream.buffered.fetch_add(bytes.len(), Ordering::Relaxed);
            true
        }

        fn buffered_bytes(&self, stream: &Self::Stream) -> usize {
            stream.polls.fetch_add(1, Ordering::Relaxed);
            let current = stream.buffered.load(Ordering::Relaxed);
            stream
                .buffered
                .store(current.saturating_sub(stream.drain_step), Ordering::Relaxed);
            current
        }

        fn close(&self, _stream: Self::Stream) -> crate::Result<()> {
            self.closed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }
}
