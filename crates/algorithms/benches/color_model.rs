//! Benchmarks for color model fitting and scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use colordist_algorithms::color_model::{
    BandSelection, ColorModel, GaussianMixtureModel, GmmParams, MahalanobisModel, PixelSample,
};
use colordist_core::{GeoTransform, MultibandRaster};
use ndarray::{Array2, Array3};

fn create_image(size: usize) -> MultibandRaster<f64> {
    let data = Array3::from_shape_fn((4, size, size), |(b, row, col)| {
        if b == 3 {
            255.0
        } else {
            ((row * 7 + col * 13 + b * 31) % 256) as f64
        }
    });
    let mut img = MultibandRaster::from_array(data);
    img.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    img
}

fn create_sample(n: usize) -> PixelSample {
    let values = Array2::from_shape_fn((3, n), |(b, i)| {
        let cluster = if i % 2 == 0 { 60.0 } else { 180.0 };
        cluster + ((i * (b + 3)) % 17) as f64
    });
    PixelSample::from_values(values, BandSelection::new(vec![0, 1, 2])).unwrap()
}

fn bench_mahalanobis_score(c: &mut Criterion) {
    let mut model = MahalanobisModel::default();
    model.fit(&create_sample(2000)).unwrap();

    let mut group = c.benchmark_group("color_model/mahalanobis_score");
    for size in [256, 512, 1024, 2048] {
        let img = create_image(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| model.score(black_box(&img)).unwrap())
        });
    }
    group.finish();
}

fn bench_gmm_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_model/gmm_score");
    let img = create_image(512);
    for components in [1, 2, 4] {
        let mut model = GaussianMixtureModel::new(GmmParams::new(components)).unwrap();
        model.fit(&create_sample(2000)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(components), &components, |b, _| {
            b.iter(|| model.score(black_box(&img)).unwrap())
        });
    }
    group.finish();
}

fn bench_gmm_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("color_model/gmm_fit");
    group.sample_size(20);
    for n in [500, 2000, 8000] {
        let sample = create_sample(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut model = GaussianMixtureModel::new(GmmParams::new(2)).unwrap();
                model.fit(black_box(&sample)).unwrap();
                model
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mahalanobis_score, bench_gmm_score, bench_gmm_fit);
criterion_main!(benches);
