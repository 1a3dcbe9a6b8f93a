use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use boost_supply::relay::{ByteRing, SharedRing};

fn ring_throughput_bench(c: &mut Criterion) {
    let mut ring = ByteRing::new(vec![0; 256]).unwrap();
    let frame = [0x5a_u8; 32];
    let mut out = [0u8; 32];

    c.bench_function("ring_put_get_32", |b| {
        b.iter(|| {
            ring.put(black_box(&frame)).unwrap();
            ring.get(black_box(&mut out)).unwrap()
        })
    });

    // Same traffic through the locked wrapper measures the strategy overhead.
    let shared = SharedRing::thread_safe(vec![0; 256]).unwrap();
    c.bench_function("shared_ring_put_get_32", |b| {
        b.iter(|| {
            shared.put(black_box(&frame)).unwrap();
            shared.get(black_box(&mut out)).unwrap()
        })
    });
}

fn ring_search_bench(c: &mut Criterion) {
    let mut ring = ByteRing::new(vec![0; 256]).unwrap();
    for _ in 0..6 {
        ring.put(b"CC: 0, Voltage: 4993mV, Current: 101mA\n").unwrap();
    }

    c.bench_function("ring_index_of_newline", |b| {
        b.iter(|| ring.index_of(black_box(b'\n')).unwrap())
    });

    c.bench_function("ring_find_pattern", |b| {
        b.iter(|| ring.find(black_box(b"Current")).unwrap())
    });
}

criterion_group!(benches, ring_throughput_bench, ring_search_bench);
criterion_main!(benches);
