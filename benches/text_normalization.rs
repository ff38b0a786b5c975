use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use medqa::text::TextChain;
use medqa::{cleanup, normalize_case};
use std::hint::black_box;

/// Build an answer of roughly `sentences` sentences with typical artifacts.
fn synthetic_answer(sentences: usize) -> String {
    let fragments = [
        "Fever Is Usually A Sign Of Infection.",
        "|| Drink Plenty Of Fluids ##",
        "Take Ibuprofen...or Paracetamol!!",
        ".hydration Is Key \u{FFFD}",
        "Consult A Doctor If Pain Persists.",
    ];
    fragments
        .iter()
        .cycle()
        .take(sentences)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("answer_normalization");
    let chain = TextChain::answer_normalization();

    for sentences in [5, 50, 500] {
        let input = synthetic_answer(sentences);
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::new("cleanup", sentences), &input, |b, text| {
            b.iter(|| cleanup(black_box(text)))
        });
        group.bench_with_input(
            BenchmarkId::new("normalize_case", sentences),
            &input,
            |b, text| b.iter(|| normalize_case(black_box(text))),
        );
        group.bench_with_input(BenchmarkId::new("chain", sentences), &input, |b, text| {
            b.iter(|| chain.apply(black_box(text)))
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
