//! Benchmark: cached kernel lookup and launch overhead vs host GEMM cost.

use std::sync::Arc;
use std::time::Instant;

use kiln_core::{AccessMode, DType, ExecutionTarget, GemmDesc, KernelArguments, KernelRange};
use kiln_exec::{ExecutionContext, HostQueue};

const SRC: &str = "__kernel void touch(__global float* x) { x[0] = x[0]; }";

fn bench_lookup(ctx: &ExecutionContext<HostQueue>, iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = ctx.kernel_factory().get_kernel("touch").unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_rebuild(ctx: &ExecutionContext<HostQueue>, iters: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        let _ = ctx.kernel_factory().build(ExecutionTarget::Gpu, "bench", SRC, "").unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_launch(ctx: &ExecutionContext<HostQueue>, iters: usize) -> f64 {
    let kernel = ctx.kernel_factory().get_kernel("touch").unwrap();
    let x = ctx.allocate(DType::F32, 1).unwrap();
    let args = KernelArguments::new().buffer(x, AccessMode::ReadWrite);
    let start = Instant::now();
    for _ in 0..iters {
        ctx.run_range(KernelRange::new(1), &kernel, &args).unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_gemm(ctx: &ExecutionContext<HostQueue>, n: usize, iters: usize) -> f64 {
    let data: Vec<f64> = (0..n * n).map(|i| ((i * 7 + 3) % 13) as f64 * 0.1 - 0.6).collect();
    let a = ctx.allocate(DType::F64, n * n).unwrap();
    ctx.copy_from_host(&a, 0, &data, 0, data.len()).unwrap();
    let c = ctx.allocate(DType::F64, n * n).unwrap();
    let desc = GemmDesc::packed(n, n, n);
    let start = Instant::now();
    for _ in 0..iters {
        ctx.gemm(&desc, &a, &a, &c).unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn main() {
    let queue = HostQueue::builder().kernel("touch", |_| Ok(())).build();
    let ctx = ExecutionContext::new(Arc::new(queue));
    ctx.kernel_factory().build(ExecutionTarget::Gpu, "bench", SRC, "").unwrap();

    println!("=== Kiln Dispatch Benchmark ===\n");

    let iters = 100_000;
    println!("{:<24} {:>12}", "Operation", "Time (us)");
    println!("{}", "-".repeat(38));
    println!("{:<24} {:>12.3}", "build (cached)", bench_rebuild(&ctx, iters) * 1e6);
    println!("{:<24} {:>12.3}", "get_kernel (cached)", bench_lookup(&ctx, iters) * 1e6);
    println!("{:<24} {:>12.3}", "run_range", bench_launch(&ctx, iters) * 1e6);

    println!();
    println!("{:<12} {:>12} {:>10}", "GEMM size", "Time (ms)", "GFLOP/s");
    println!("{}", "-".repeat(36));
    for &n in &[32usize, 64, 128, 256] {
        let iters = if n <= 64 { 200 } else { 10 };
        let secs = bench_gemm(&ctx, n, iters);
        let gflops = 2.0 * (n * n * n) as f64 / secs / 1e9;
        println!("{:<12} {:>10.3}ms {:>10.2}", format!("{}x{}", n, n), secs * 1e3, gflops);
    }
}
