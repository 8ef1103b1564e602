use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use striped_align::{MemTally, Scoring, StripedAligner};

fn read_and_window(rng: &mut StdRng, read_len: usize, flank: usize) -> (Vec<u8>, Vec<u8>) {
    let read: Vec<u8> = (0..read_len).map(|_| (rng.next_u32() % 4) as u8).collect();
    let mut rf: Vec<u8> = (0..flank).map(|_| (rng.next_u32() % 4) as u8).collect();
    for &b in &read {
        // Sprinkle mismatches and short indels so the backtrace has work.
        match rng.next_u32() % 20 {
            0 => rf.push((b + 1) % 4),
            1 => {}
            _ => rf.push(b),
        }
    }
    rf.extend((0..flank).map(|_| (rng.next_u32() % 4) as u8));
    (read, rf)
}

fn bench_fill_and_backtrace(c: &mut Criterion) {
    let mut group = c.benchmark_group("striped_align");
    for read_len in [100usize, 250] {
        let mut rng = StdRng::seed_from_u64(0xdead);
        let (read, rf) = read_and_window(&mut rng, read_len, 10);
        let quals = vec![40u8; read_len];
        let mut aligner = StripedAligner::new(Scoring::local(), Arc::new(MemTally::new()));

        group.throughput(Throughput::Elements((read_len * rf.len()) as u64));
        group.bench_function(format!("local_{read_len}bp"), |b| {
            b.iter(|| {
                let aln = aligner.align(
                    black_box(&read),
                    black_box(&quals),
                    black_box(&rf),
                    &mut rng,
                );
                black_box(aln)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fill_and_backtrace);
criterion_main!(benches);
