use std::hint::black_box;

use ahash::AHashMap;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wordshard::{
    DocKey, Direction, DocumentKind, IndexShard, WordId, decode_ints, encode_ints, pack_posting,
    unpack_posting,
};

/// Gap sequence mixing runs of small values with occasional large ones.
fn generate_gaps(rng: &mut StdRng, count: usize) -> Vec<u64> {
    (0..count)
        .map(|i| {
            if i % 64 == 0 {
                rng.random_range(0..1u64 << 30)
            } else {
                rng.random_range(0..16)
            }
        })
        .collect()
}

fn generate_positions(rng: &mut StdRng, count: usize) -> Vec<u64> {
    let mut position = 0;
    generate_gaps(rng, count)
        .into_iter()
        .map(|gap| {
            position += gap + 1;
            position
        })
        .collect()
}

fn bench_int_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Modified9");
    let mut rng = StdRng::seed_from_u64(42);
    for count in [16usize, 256, 4096] {
        let values = generate_gaps(&mut rng, count);
        let encoded = encode_ints(&values);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("encode", count), &values, |b, values| {
            b.iter(|| encode_ints(black_box(values)))
        });
        group.bench_with_input(BenchmarkId::new("decode", count), &encoded, |b, encoded| {
            b.iter(|| {
                let mut offset = 0;
                decode_ints(black_box(encoded), &mut offset).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_posting(c: &mut Criterion) {
    let mut group = c.benchmark_group("Posting");
    let mut rng = StdRng::seed_from_u64(42);
    let positions = generate_positions(&mut rng, 200);
    let packed = pack_posting(33689, &positions).unwrap();

    group.bench_function("pack", |b| {
        b.iter(|| pack_posting(black_box(33689), black_box(&positions)).unwrap())
    });
    group.bench_function("unpack", |b| {
        b.iter(|| {
            let mut offset = 0;
            unpack_posting(black_box(&packed), &mut offset, true).unwrap()
        })
    });
    group.finish();
}

fn bench_shard_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("Shard Scan");
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(42);
    let mut shard = IndexShard::new(0);
    let common = WordId::from_raw(b"common");
    for doc in 0..5000u64 {
        let mut words = AHashMap::new();
        words.insert(common, generate_positions(&mut rng, 8));
        words.insert(WordId::from_bytes(doc.to_be_bytes()), vec![1]);
        shard
            .add_document_words(
                &DocKey::from_hashes(&[doc, doc ^ 0xff]),
                doc,
                &words,
                &[],
                DocumentKind::Page,
            )
            .unwrap();
    }

    for direction in [Direction::Ascending, Direction::Descending] {
        group.bench_with_input(
            BenchmarkId::new("page", format!("{direction:?}")),
            &direction,
            |b, &direction| b.iter(|| shard.get_postings_slice_by_id(common, 100, direction).unwrap()),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_int_codec, bench_posting, bench_shard_scan);
criterion_main!(benches);
