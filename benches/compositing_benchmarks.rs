use bgremove_api::{composite, ImageIOService, SegmentationMask};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, GenericImageView, ImageFormat};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{encode, pipeline, subject_on_background, BrightnessBackend};

const SIZES: &[(u32, u32)] = &[(256, 256), (1024, 768), (1920, 1080)];

fn bench_mask_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_resample");
    let mask = SegmentationMask::new(
        (0..1024 * 1024).map(|i| (i % 256) as u8).collect(),
        (1024, 1024),
    )
    .expect("mask");

    for &(w, h) in SIZES {
        let id = BenchmarkId::from_parameter(format!("{w}x{h}"));
        group.bench_with_input(id, &(w, h), |b, &(w, h)| {
            b.iter(|| black_box(mask.resize(w, h).expect("resize")));
        });
    }
    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    for &(w, h) in SIZES {
        let image = subject_on_background(w, h);
        let mask =
            SegmentationMask::new(vec![128; (w * h) as usize], image.dimensions()).expect("mask");
        let id = BenchmarkId::from_parameter(format!("{w}x{h}"));
        group.bench_with_input(id, &image, |b, image| {
            b.iter(|| black_box(composite(image, &mask).expect("composite")));
        });
    }
    group.finish();
}

fn bench_process_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_bytes");
    group.sample_size(20);
    let pipeline = pipeline(BrightnessBackend::new());

    for &(w, h) in SIZES {
        let jpeg = encode(&subject_on_background(w, h), ImageFormat::Jpeg);
        let id = BenchmarkId::from_parameter(format!("{w}x{h}"));
        group.bench_with_input(id, &jpeg, |b, jpeg| {
            b.iter(|| black_box(pipeline.process_bytes(jpeg).expect("process")));
        });
    }
    group.finish();
}

fn bench_png_encode(c: &mut Criterion) {
    let image: DynamicImage = subject_on_background(1024, 768);
    let rgba = image.to_rgba8();
    c.bench_function("png_encode_1024x768", |b| {
        b.iter(|| black_box(ImageIOService::encode_png(&rgba).expect("encode")));
    });
}

criterion_group!(
    benches,
    bench_mask_resample,
    bench_composite,
    bench_process_bytes,
    bench_png_encode
);
criterion_main!(benches);
