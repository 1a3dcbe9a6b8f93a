//! Cross-context traffic through the locked ring: an interrupt-style
//! producer and a polled consumer must agree on every byte.

use std::sync::Arc;
use std::thread;

use boost_supply::relay::{RingError, SharedRing};

#[test]
fn producer_and_consumer_agree_on_every_byte() {
    const TOTAL: usize = 64 * 1024;
    let ring = Arc::new(SharedRing::thread_safe(vec![0u8; 64]).unwrap());

    let producer = {
        let ring = ring.clone();
        thread::spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                // Rolling pattern, written in uneven chunks to exercise the
                // wraparound paths.
                let chunk = (sent % 13 + 1).min(TOTAL - sent);
                let data: Vec<u8> = (sent..sent + chunk).map(|i| (i % 251) as u8).collect();
                match ring.put(&data) {
                    Ok(()) => sent += chunk,
                    // Full: retry after the consumer catches up.
                    Err(RingError::Overflow) => thread::yield_now(),
                    Err(e) => panic!("producer failed: {e}"),
                }
            }
        })
    };

    let consumer = {
        let ring = ring.clone();
        thread::spawn(move || {
            let mut received = 0usize;
            let mut buf = [0u8; 17];
            while received < TOTAL {
                let count = ring.get(&mut buf).unwrap();
                if count == 0 {
                    thread::yield_now();
                    continue;
                }
                for (i, &byte) in buf[..count].iter().enumerate() {
                    let expected = ((received + i) % 251) as u8;
                    assert_eq!(byte, expected, "corrupt byte at offset {}", received + i);
                }
                received += count;
            }
        })
    };

    producer.join().expect("producer");
    consumer.join().expect("consumer");
    assert_eq!(ring.peek(), 0, "bytes written minus bytes read must be zero");
}

#[test]
fn searches_do_not_disturb_concurrent_accounting() {
    let ring = Arc::new(SharedRing::thread_safe(vec![0u8; 128]).unwrap());
    ring.put(b"status: ok\n").unwrap();

    // A scanning reader on one thread must not consume anything while the
    // owner keeps writing on another.
    let scanner = {
        let ring = ring.clone();
        thread::spawn(move || {
            for _ in 0..1_000 {
                if let Ok(idx) = ring.index_of(b'\n') {
                    assert!(idx < 128);
                }
                let _ = ring.find(b"status");
            }
        })
    };

    for _ in 0..50 {
        // Ignore overflow; the point is that scans never free space.
        let _ = ring.put(b"x");
    }
    scanner.join().expect("scanner");

    // 11 initial bytes plus whatever writes fit; scans consumed nothing.
    assert!(ring.peek() >= 11);
    assert_eq!(ring.index_of(b's').unwrap(), 0);
}
