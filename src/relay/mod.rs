// Byte relay: the generic ring buffer plus the console producer/consumer
// glue built on top of it. Shared between the sampling context (producer)
// and the polled host-servicing context (consumer).

pub mod console;
pub mod ring;

pub use console::{FRAME_LEN, FramePoller, PrintSink, take_line};
pub use ring::{ByteRing, ExclusiveLock, MutexLock, NoLock, RingError, RingLock, SharedRing};
