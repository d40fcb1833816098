//! Audio preprocessing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seamless_stt_server::audio::resample;
use seamless_stt_server::model::{FeatureConfig, FeatureExtractor};

fn tone(rate: u32, seconds: f32) -> Vec<f32> {
    let len = (rate as f32 * seconds) as usize;
    (0..len)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin())
        .collect()
}

fn bench_feature_extraction(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
    let mut group = c.benchmark_group("fbank_features");

    for seconds in [1.0f32, 5.0, 30.0] {
        let samples = tone(16000, seconds);
        group.bench_with_input(BenchmarkId::from_parameter(seconds), &samples, |b, samples| {
            b.iter(|| {
                let batch = extractor.extract(black_box(samples), 16000).unwrap();
                black_box(batch.frames());
            });
        });
    }

    group.finish();
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_to_16k");

    for rate in [22050u32, 44100, 48000] {
        let samples = tone(rate, 5.0);
        group.bench_with_input(BenchmarkId::from_parameter(rate), &samples, |b, samples| {
            b.iter(|| {
                let out = resample(black_box(samples), rate, 16000).unwrap();
                black_box(out.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_feature_extraction, bench_resample);
criterion_main!(benches);
