use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use arm_gemm::prelude::*;

fn bench_sgemm(c: &mut Criterion) {
    let mut group = c.benchmark_group("Gemm_f32");
    group.sample_size(20);

    for size in [64, 128, 256, 512, 1024].iter() {
        let n = *size;
        let flops = 2 * (n * n * n) as u64;

        let a: Vec<f32> = (0..n * n).map(|i| ((i % 1000) as f32) * 0.01).collect();
        let b: Vec<f32> = (0..n * n)
            .map(|i| (((i + 500) % 1000) as f32) * 0.01)
            .collect();
        let mut out = vec![0.0f32; n * n];

        group.throughput(Throughput::Elements(flops));

        group.bench_with_input(BenchmarkId::new("native", n), &n, |bench, &n| {
            bench.iter(|| black_box(matmul::<f32, f32>(&a, n, n, &b, n)));
        });

        group.bench_with_input(BenchmarkId::new("pretransposed", n), &n, |bench, &n| {
            let gemm = Gemm::<f32, f32>::new(n, n, n).pretransposed();
            bench.iter(|| black_box(gemm.execute(&a, n, &b, n, &mut out, n)));
        });
    }

    group.finish();
}

fn bench_int8(c: &mut Criterion) {
    let mut group = c.benchmark_group("Gemm_i8");
    group.sample_size(20);

    for size in [128, 256, 512].iter() {
        let n = *size;
        let a: Vec<i8> = (0..n * n).map(|i| (i % 17) as i8 - 8).collect();
        let b: Vec<i8> = (0..n * n).map(|i| (i % 13) as i8 - 6).collect();

        group.throughput(Throughput::Elements(2 * (n * n * n) as u64));

        group.bench_with_input(BenchmarkId::new("i8_i32", n), &n, |bench, &n| {
            bench.iter(|| black_box(matmul::<i8, i32>(&a, n, n, &b, n)));
        });
    }

    group.finish();
}

fn bench_gemv(c: &mut Criterion) {
    let mut group = c.benchmark_group("Gemv_f32");
    group.sample_size(20);

    for size in [256, 1024, 4096].iter() {
        let m = *size;
        let k = 256;
        let a: Vec<f32> = (0..m * k).map(|i| ((i % 100) as f32) * 0.1).collect();
        let x: Vec<f32> = (0..k).map(|i| (i % 10) as f32).collect();

        group.throughput(Throughput::Elements((2 * m * k) as u64));

        group.bench_with_input(BenchmarkId::new("gemv", m), &m, |bench, &m| {
            bench.iter(|| black_box(matmul::<f32, f32>(&a, m, k, &x, 1)));
        });
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let ci = CpuInfo::generic().with_features(CpuFeatures::NEON | CpuFeatures::DOTPROD);
    let args = GemmArgs::new(&ci, 512, 512, 512).pretransposed();

    c.bench_function("select_f32_method", |bench| {
        bench.iter(|| black_box(arm_gemm::get_gemm_method::<f32, f32>(black_box(&args), &OutputStage::Nothing)));
    });
}

criterion_group!(benches, bench_sgemm, bench_int8, bench_gemv, bench_selection);
criterion_main!(benches);
