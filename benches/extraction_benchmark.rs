//! Throughput of the pure per-record rules: title attribute inference and
//! candidate normalization with quality scoring.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use catalog_harvester::domain::services::{infer_attributes, normalize_candidate};
use catalog_harvester::test_utils::candidate;

const TITLES: &[&str] = &[
    "Phone X 8GB RAM 128GB 5000mAh 5G",
    "Acme Nova 12 Pro (Midnight Black, 12GB RAM, 256GB Storage) 6.7 inch 120Hz AMOLED, 67W fast charging",
    "Zephyr Tab S9 11\" WiFi + 5G, Snapdragon 8 Gen 2, Android 13, 50MP camera, 8000 mAh",
    "USB-C hub 7-in-1",
];

fn bench_title_inference(c: &mut Criterion) {
    c.bench_function("infer_attributes", |b| {
        b.iter(|| {
            for title in TITLES {
                black_box(infer_attributes(black_box(title)));
            }
        });
    });
}

fn bench_normalization(c: &mut Criterion) {
    let mut inverted = candidate("SKU-2");
    inverted.current_price = Some(1000.0);
    inverted.original_price = Some(800.0);
    inverted.rating = Some(7.0);
    let records = vec![candidate("SKU-1"), inverted];

    c.bench_function("normalize_candidate", |b| {
        b.iter(|| {
            for record in &records {
                let _ = black_box(normalize_candidate(record.clone()));
            }
        });
    });
}

criterion_group!(benches, bench_title_inference, bench_normalization);
criterion_main!(benches);
