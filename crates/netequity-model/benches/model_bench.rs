//! Criterion benchmarks for netequity-model: training pipeline and scenario prediction.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use netequity_model::{
    Feature, FeatureDataset, FeatureRecord, PredictOptions, Preset, TrainingConfig, predict_preset,
    simulate, train,
};

fn make_dataset(n: usize, seed: u64) -> FeatureDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let level: f64 = rng.r#gen();
            let values = std::array::from_fn(|f| {
                let noise = rng.r#gen::<f64>() * 0.1;
                (rng.r#gen::<f64>() > 0.05).then_some((f + 1) as f64 * (level + noise))
            });
            FeatureRecord::new(format!("c{i}"), values, 100.0 * level * level)
        })
        .collect()
}

fn bench_train(c: &mut Criterion) {
    let dataset = make_dataset(200, 42);
    let config = TrainingConfig::new();

    c.bench_function("model_train_200_records_100trees", |b| {
        b.iter(|| train(&dataset, &config).unwrap());
    });
}

fn bench_predict_preset(c: &mut Criterion) {
    let dataset = make_dataset(200, 42);
    let model = train(&dataset, &TrainingConfig::new()).unwrap().into_model();
    let options = PredictOptions::new();

    c.bench_function("model_predict_preset_with_contributions", |b| {
        b.iter(|| predict_preset(&model, Preset::Developed, &options).unwrap());
    });
}

fn bench_simulate(c: &mut Criterion) {
    let dataset = make_dataset(200, 42);
    let model = train(&dataset, &TrainingConfig::new()).unwrap().into_model();

    c.bench_function("model_simulate_200_records", |b| {
        b.iter(|| simulate(&model, &dataset, Feature::GdpPerCapita, 10.0, 10).unwrap());
    });
}

criterion_group!(benches, bench_train, bench_predict_preset, bench_simulate);
criterion_main!(benches);
