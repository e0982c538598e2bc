use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use bitonic_sidecar::config::{BackendKind, Request};
use bitonic_sidecar::present::{FrameSummary, NullSink, PgmSink, SummarySink, is_sorted};
use bitonic_sidecar::{
    BatchReport, ComputeBackend, GpuBackend, GridSize, HostBackend, Seed, SortScheduler,
};

#[derive(Debug, Serialize)]
struct BatchResponse {
    ok: bool,
    backend: &'static str,
    size_exponent: u32,
    side: u32,
    elements: usize,
    seed: [f32; 2],
    passes: u64,
    elapsed_seconds: f64,
    summary: FrameSummary,
}

#[derive(Debug, Serialize)]
struct AnimateResponse {
    ok: bool,
    backend: &'static str,
    size_exponent: u32,
    side: u32,
    elements: usize,
    seed: [f32; 2],
    interval_ms: u64,
    passes: u64,
    pass_seconds: f64,
    wall_seconds: f64,
    frames: Vec<FrameSummary>,
}

#[derive(Debug, Serialize)]
struct VerifyRun {
    ok: bool,
    size_exponent: i64,
    elements: usize,
    passes: u64,
    gpu_elapsed_ms: f64,
    host_elapsed_ms: f64,
    sample: [f32; 4],
    sorted: bool,
    permutation: bool,
    mismatch_count: u32,
    max_abs_error: f32,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    ok: bool,
    backend: &'static str,
    seed: [f32; 2],
    runs: Vec<VerifyRun>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req = Request::parse(&input).context("invalid JSON request")?;

    match req {
        Request::Batch {
            size_exponent,
            seed,
            backend,
            image,
        } => {
            let seed = seed.unwrap_or_else(Seed::random);
            let resp = match backend {
                BackendKind::Gpu => run_batch(open_gpu()?, size_exponent, seed, image)?,
                BackendKind::Host => run_batch(HostBackend::new(), size_exponent, seed, image)?,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Animate {
            size_exponent,
            seed,
            backend,
            interval_ms,
            image,
        } => {
            let seed = seed.unwrap_or_else(Seed::random);
            let resp = match backend {
                BackendKind::Gpu => run_animate(open_gpu()?, size_exponent, seed, interval_ms, image)?,
                BackendKind::Host => {
                    run_animate(HostBackend::new(), size_exponent, seed, interval_ms, image)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Verify { sizes, seed } => {
            let seed = seed.unwrap_or_else(Seed::random);
            let mut gpu = SortScheduler::new(open_gpu()?, NullSink);
            let mut host = SortScheduler::new(HostBackend::new(), NullSink);
            let mut runs = Vec::with_capacity(sizes.len());
            for size_exponent in sizes {
                runs.push(
                    verify_size(&mut gpu, &mut host, size_exponent, seed)
                        .with_context(|| format!("verify size exponent {size_exponent}"))?,
                );
            }
            let resp = VerifyResponse {
                ok: runs.iter().all(|r| r.ok),
                backend: gpu.backend().name(),
                seed: seed.0,
                runs,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}

fn open_gpu() -> Result<GpuBackend> {
    GpuBackend::new().context("GPU backend unavailable")
}

fn run_batch<B: ComputeBackend>(
    backend: B,
    size_exponent: i64,
    seed: Seed,
    image: Option<PathBuf>,
) -> Result<BatchResponse> {
    let mut scheduler = SortScheduler::new(backend, (SummarySink::new(), image.map(PgmSink::new)));
    scheduler.reset(size_exponent, seed)?;
    let report = scheduler.run_batch()?.context("batch run rejected")?;
    let grid = scheduler.grid().context("no grid after reset")?;
    let summary = scheduler
        .sink()
        .0
        .last()
        .cloned()
        .context("no frame presented")?;

    Ok(BatchResponse {
        ok: summary.sorted && report.passes == grid.total_passes(),
        backend: scheduler.backend().name(),
        size_exponent: grid.exponent(),
        side: grid.side(),
        elements: grid.element_count(),
        seed: seed.0,
        passes: report.passes,
        elapsed_seconds: report.elapsed.as_secs_f64(),
        summary,
    })
}

fn run_animate<B: ComputeBackend>(
    backend: B,
    size_exponent: i64,
    seed: Seed,
    interval_ms: u64,
    image: Option<PathBuf>,
) -> Result<AnimateResponse> {
    let t0 = std::time::Instant::now();
    let mut scheduler = SortScheduler::new(backend, (SummarySink::recording(), image.map(PgmSink::new)));
    scheduler.reset(size_exponent, seed)?;
    scheduler.run_animated(Duration::from_millis(interval_ms))?;
    let grid = scheduler.grid().context("no grid after reset")?;
    let frames = scheduler.sink_mut().0.take_history();
    let sorted = frames.last().is_some_and(|f| f.sorted);

    Ok(AnimateResponse {
        ok: sorted && scheduler.draw_calls() == grid.total_passes(),
        backend: scheduler.backend().name(),
        size_exponent: grid.exponent(),
        side: grid.side(),
        elements: grid.element_count(),
        seed: seed.0,
        interval_ms,
        passes: scheduler.draw_calls(),
        pass_seconds: scheduler.elapsed().as_secs_f64(),
        wall_seconds: t0.elapsed().as_secs_f64(),
        frames,
    })
}

/// Initial and final front buffers of one batch run.
fn sorted_run<B: ComputeBackend>(
    scheduler: &mut SortScheduler<B, NullSink>,
    size_exponent: i64,
    seed: Seed,
) -> Result<(Vec<f32>, Vec<f32>, BatchReport)> {
    scheduler.reset(size_exponent, seed)?;
    let initial = scheduler.snapshot()?;
    let report = scheduler.run_batch()?.context("batch run rejected")?;
    let sorted = scheduler.snapshot()?;
    Ok((initial, sorted, report))
}

fn verify_size(
    gpu: &mut SortScheduler<GpuBackend, NullSink>,
    host: &mut SortScheduler<HostBackend, NullSink>,
    size_exponent: i64,
    seed: Seed,
) -> Result<VerifyRun> {
    let (initial, out, gpu_report) = sorted_run(gpu, size_exponent, seed)?;
    let (_, expected, host_report) = sorted_run(host, size_exponent, seed)?;
    let grid = gpu.grid().context("no grid after reset")?;
    Ok(compare_runs(
        size_exponent,
        grid,
        initial,
        &out,
        &expected,
        gpu_report,
        host_report,
    ))
}

/// Checks the device result against the host result for the same seed.
fn compare_runs(
    size_exponent: i64,
    grid: GridSize,
    initial: Vec<f32>,
    out: &[f32],
    expected: &[f32],
    gpu_report: BatchReport,
    host_report: BatchReport,
) -> VerifyRun {
    let mut mismatch_count = 0u32;
    let mut max_abs_error = 0.0f32;
    for (&v, &e) in out.iter().zip(expected) {
        let err = (v - e).abs();
        if err > 0.0 {
            mismatch_count += 1;
        }
        max_abs_error = max_abs_error.max(err);
    }

    let mut reference = initial;
    reference.sort_by(f32::total_cmp);
    let permutation = reference == out;
    let sorted = is_sorted(out);
    let len = out.len();
    let last = len.saturating_sub(1);
    let at = |i: usize| out.get(i.min(last)).copied().unwrap_or(0.0);
    let passes_ok = gpu_report.passes == grid.total_passes()
        && host_report.passes == grid.total_passes();

    VerifyRun {
        ok: mismatch_count == 0
            && len == expected.len()
            && len == grid.element_count()
            && passes_ok
            && sorted
            && permutation,
        size_exponent,
        elements: len,
        passes: gpu_report.passes,
        gpu_elapsed_ms: gpu_report.elapsed.as_secs_f64() * 1000.0,
        host_elapsed_ms: host_report.elapsed.as_secs_f64() * 1000.0,
        sample: [at(0), at(1), at(10), at(last)],
        sorted,
        permutation,
        mismatch_count,
        max_abs_error,
    }
}
