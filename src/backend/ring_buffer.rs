//! Ring buffer for concurrent sample submission and playback
//!
//! One producer (the guest thread submitting port audio) and one consumer
//! (the host playback callback) operate concurrently. Memory is fixed at
//! `capacity * sizeof(f32)` for the life of the stream.
//!
//! Positions are tracked with atomics for cross-thread visibility; the
//! storage itself sits behind a `parking_lot::Mutex`, and free space is
//! recomputed while the lock is held so a concurrent read cannot invalidate
//! the calculation.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{AudiomuxError, Result};

/// Largest permitted allocation, 512 MB worth of f32 samples
const MAX_CAPACITY: usize = 512 * 1024 * 1024 / std::mem::size_of::<f32>();

/// Fixed-capacity ring buffer of f32 samples
///
/// One slot is always left empty to distinguish full from empty, so the
/// usable capacity is `capacity - 1` samples.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Mutex<Vec<f32>>,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    capacity: usize,
    /// `pos & mask == pos % capacity`, capacity being a power of two
    mask: usize,
}

impl RingBuffer {
    /// Create a ring buffer holding at least `requested_capacity` samples
    ///
    /// The capacity is rounded up to the next power of two. Zero and
    /// oversized requests are rejected.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(AudiomuxError::Config(
                "ring buffer capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();
        if capacity > MAX_CAPACITY {
            return Err(AudiomuxError::Config(format!(
                "ring buffer capacity {capacity} exceeds maximum safe size {MAX_CAPACITY}"
            )));
        }

        Ok(RingBuffer {
            buffer: Mutex::new(vec![0.0; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples available to read without blocking
    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        if write >= read {
            write - read
        } else {
            self.capacity - (read - write)
        }
    }

    /// Write samples from `samples`, returning how many fit
    ///
    /// Returns 0 when the buffer is full; the producer decides whether to
    /// retry or drop.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let free = if write_pos >= read_pos {
            self.capacity - (write_pos - read_pos) - 1
        } else {
            (read_pos - write_pos) - 1
        };

        let to_write = samples.len().min(free);
        if to_write == 0 {
            return 0;
        }

        let write_idx = write_pos & self.mask;
        if write_idx + to_write <= self.capacity {
            buf[write_idx..write_idx + to_write].copy_from_slice(&samples[..to_write]);
        } else {
            // Wrap-around write in two parts
            let first = self.capacity - write_idx;
            buf[write_idx..].copy_from_slice(&samples[..first]);
            buf[..to_write - first].copy_from_slice(&samples[first..to_write]);
        }

        drop(buf);
        self.write_pos
            .store(write_pos + to_write, Ordering::Release);

        to_write
    }

    /// Read samples into `dest`, returning how many were available
    pub fn read(&self, dest: &mut [f32]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available = if write_pos >= read_pos {
            write_pos - read_pos
        } else {
            self.capacity - (read_pos - write_pos)
        };

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        let read_idx = read_pos & self.mask;
        if read_idx + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&buf[read_idx..read_idx + to_read]);
        } else {
            // Wrap-around read in two parts
            let first = self.capacity - read_idx;
            dest[..first].copy_from_slice(&buf[read_idx..]);
            dest[first..to_read].copy_from_slice(&buf[..to_read - first]);
        }

        drop(buf);
        self.read_pos.store(read_pos + to_read, Ordering::Release);

        to_read
    }

    /// Fill level from 0.0 (empty) to 1.0 (full)
    pub fn fill_percentage(&self) -> f32 {
        (self.available_read() as f32) / (self.capacity as f32)
    }
}
