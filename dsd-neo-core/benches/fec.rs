use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dsd_neo_core::fec::rs::ReedSolomon;
use dsd_neo_core::fec::{crc, golay, viterbi};

fn benchmark_rs_error_decode(c: &mut Criterion) {
    let rs = ReedSolomon::new(24, 12);
    let msg: Vec<u8> = (0..12).map(|i| (i * 5 + 1) as u8 % 64).collect();
    let mut codeword = rs.encode(&msg);
    codeword[0] ^= 0x17;
    codeword[5] ^= 0x09;
    c.bench_function("rs_24_12_decode_errors", |b| {
        b.iter(|| black_box(rs.decode_errors(black_box(&codeword))));
    });
}

fn benchmark_rs_erasure_decode(c: &mut Criterion) {
    let rs = ReedSolomon::new(63, 35);
    let msg: Vec<u8> = (0..35).map(|i| (i * 7 + 1) as u8 % 64).collect();
    let codeword = rs.encode(&msg);
    let erasures: Vec<usize> = (0..28).collect();
    let mut damaged = codeword.clone();
    for &e in &erasures {
        damaged[e] = 0;
    }
    c.bench_function("rs_63_35_decode_erasures", |b| {
        b.iter(|| black_box(rs.decode_erasures(black_box(&damaged), black_box(&erasures))));
    });
}

fn benchmark_viterbi_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("viterbi_decode");
    for steps in [12usize, 98, 196] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            let data: Vec<u8> = (0..steps).map(|i| (i % 4) as u8).collect();
            let tx = viterbi::encode(&data);
            let reliabilities = vec![220u8; tx.len()];
            b.iter(|| black_box(viterbi::decode(black_box(&tx), black_box(&reliabilities))));
        });
    }
    group.finish();
}

fn benchmark_golay_decode(c: &mut Criterion) {
    let codeword = golay::encode(0b1010_1100_1101);
    c.bench_function("golay_24_12_decode", |b| {
        b.iter(|| black_box(golay::decode(black_box(codeword))));
    });
}

fn benchmark_crc16_compute(c: &mut Criterion) {
    let bits: Vec<u8> = (0..80).map(|i| (i % 3 == 0) as u8).collect();
    c.bench_function("crc16_compute_80_bits", |b| {
        b.iter(|| black_box(crc::compute(black_box(bits.iter().copied()))));
    });
}

criterion_group!(
    benches,
    benchmark_rs_error_decode,
    benchmark_rs_erasure_decode,
    benchmark_viterbi_decode,
    benchmark_golay_decode,
    benchmark_crc16_compute
);
criterion_main!(benches);
