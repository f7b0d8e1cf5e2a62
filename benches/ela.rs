use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use deepfake_forensics::analysis::ela::ElaAnalyzer;
use image::{DynamicImage, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

fn sample_jpeg(size: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, 85))
        .expect("encode sample");
    buffer
}

fn bench_ela(c: &mut Criterion) {
    let mut group = c.benchmark_group("ela");

    for size in [224u32, 1024] {
        let data = sample_jpeg(size);
        group.throughput(Throughput::Elements((size * size) as u64));

        let parallel = ElaAnalyzer::new(90);
        group.bench_function(format!("parallel_{}", size), |b| {
            b.iter(|| parallel.analyze(&data))
        });

        let sequential = ElaAnalyzer::new(90).with_parallel(false);
        group.bench_function(format!("sequential_{}", size), |b| {
            b.iter(|| sequential.analyze(&data))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ela);
criterion_main!(benches);
