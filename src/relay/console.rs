//! Console byte relay over the shared ring.
//!
//! The sampling context produces formatted status text; a polled consumer on
//! the normal-priority side forwards it to the host in fixed 8-byte frames,
//! the way the report endpoint drains it. Producer writes never block: when
//! the ring is full the bytes are dropped and counted.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::relay::ring::{MutexLock, RingError, SharedRing};

/// Frame size the polled consumer forwards per request.
pub const FRAME_LEN: usize = 8;

/// `io::Write` adapter feeding formatted output into a shared ring.
///
/// Writes are all-or-nothing per call: a chunk that does not fit is dropped
/// whole rather than torn, and the drop is counted.
#[derive(Clone)]
pub struct PrintSink {
    ring: Arc<SharedRing<MutexLock>>,
    dropped: Arc<AtomicU64>,
}

impl PrintSink {
    pub fn new(ring: Arc<SharedRing<MutexLock>>) -> Self {
        Self {
            ring,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bytes dropped so far because the consumer fell behind.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Write for PrintSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.ring.put(buf).is_err() {
            self.dropped.fetch_add(buf.len() as u64, Ordering::Relaxed);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Polled consumer draining full frames from a shared ring into `out`.
pub struct FramePoller<W: Write> {
    ring: Arc<SharedRing<MutexLock>>,
    out: W,
}

impl<W: Write> FramePoller<W> {
    pub fn new(ring: Arc<SharedRing<MutexLock>>, out: W) -> Self {
        Self { ring, out }
    }

    /// Forwards every complete frame currently buffered; partial frames stay
    /// in the ring until more bytes arrive. Returns bytes relayed.
    pub fn poll(&mut self) -> io::Result<usize> {
        let mut frame = [0u8; FRAME_LEN];
        let mut relayed = 0;

        while self.ring.peek() > FRAME_LEN - 1 {
            let count = self
                .ring
                .get(&mut frame)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            self.out.write_all(&frame[..count])?;
            relayed += count;
        }
        if relayed > 0 {
            self.out.flush()?;
        }
        Ok(relayed)
    }

    /// Drains whatever is left, frame-aligned or not. Used at shutdown.
    pub fn drain(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; FRAME_LEN];
        let mut relayed = 0;

        while self.ring.peek() > 0 {
            let count = self
                .ring
                .get(&mut chunk)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            self.out.write_all(&chunk[..count])?;
            relayed += count;
        }
        self.out.flush()?;
        Ok(relayed)
    }
}

/// Extracts one complete input line (terminator included) from a ring of
/// buffered command bytes. Returns the line length, or `None` when no full
/// line is buffered yet.
pub fn take_line(
    ring: &SharedRing<MutexLock>,
    out: &mut [u8],
) -> Result<Option<usize>, RingError> {
    match ring.index_of(b'\n') {
        Ok(idx) if idx < out.len() => {
            let count = ring.get(&mut out[..=idx])?;
            Ok(Some(count))
        }
        // Line longer than the caller's buffer: consume and discard it.
        Ok(idx) => {
            let mut remaining = idx + 1;
            let mut scratch = [0u8; 16];
            while remaining > 0 {
                let take = remaining.min(scratch.len());
                let count = ring.get(&mut scratch[..take])?;
                if count == 0 {
                    break;
                }
                remaining -= count;
            }
            Ok(None)
        }
        Err(RingError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_drops_whole_chunks_on_overflow() {
        let ring = Arc::new(SharedRing::thread_safe(vec![0; 8]).unwrap());
        let mut sink = PrintSink::new(ring.clone());

        sink.write_all(b"abcde").unwrap();
        sink.write_all(b"fghij").unwrap(); // does not fit, dropped whole
        assert_eq!(ring.peek(), 5);
        assert_eq!(sink.dropped_bytes(), 5);
    }

    #[test]
    fn poller_forwards_only_complete_frames() {
        let ring = Arc::new(SharedRing::thread_safe(vec![0; 64]).unwrap());
        let mut sink = PrintSink::new(ring.clone());
        let mut captured = Vec::new();

        sink.write_all(b"0123456789ab").unwrap();
        {
            let mut poller = FramePoller::new(ring.clone(), &mut captured);
            assert_eq!(poller.poll().unwrap(), FRAME_LEN);
        }
        assert_eq!(captured, b"01234567");
        assert_eq!(ring.peek(), 4);

        // Shutdown path picks up the partial tail.
        let mut rest = Vec::new();
        let mut poller = FramePoller::new(ring, &mut rest);
        assert_eq!(poller.drain().unwrap(), 4);
        assert_eq!(rest, b"89ab");
    }

    #[test]
    fn take_line_returns_buffered_commands() {
        let ring = SharedRing::thread_safe(vec![0; 32]).unwrap();
        ring.put(b"5\nc").unwrap();

        let mut line = [0u8; 8];
        assert_eq!(take_line(&ring, &mut line).unwrap(), Some(2));
        assert_eq!(&line[..2], b"5\n");
        // 'c' has no terminator yet
        assert_eq!(take_line(&ring, &mut line).unwrap(), None);
        assert_eq!(ring.peek(), 1);
    }
}
