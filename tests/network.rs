//! End-to-end checks of the comparison network on the host backend.

use std::time::Duration;

use bitonic_sidecar::exchange::run_pass;
use bitonic_sidecar::present::{Frame, NullSink, PresentationSink, is_sorted};
use bitonic_sidecar::{GridSize, HostBackend, PassDescriptor, Seed, SortError, SortScheduler};

use proptest::prelude::*;

fn grid(k: i64) -> GridSize {
    GridSize::from_exponent(k, 12).unwrap()
}

fn sort_on_host(k: i64, seed: Seed) -> (Vec<f32>, Vec<f32>) {
    let mut scheduler = SortScheduler::new(HostBackend::new(), NullSink);
    scheduler.reset(k, seed).unwrap();
    let initial = scheduler.snapshot().unwrap();
    let report = scheduler.run_batch().unwrap().unwrap();
    assert_eq!(report.passes, grid(k).total_passes());
    (initial, scheduler.snapshot().unwrap())
}

fn assert_sorted_permutation(initial: &[f32], sorted: &[f32]) {
    let mut expected = initial.to_vec();
    expected.sort_by(f32::total_cmp);
    assert_eq!(
        sorted,
        &expected[..],
        "first diff at index {}",
        sorted
            .iter()
            .zip(&expected)
            .position(|(a, b)| a != b)
            .unwrap_or(sorted.len())
    );
}

#[test]
fn test_four_by_four_trace() {
    let g = grid(2);
    let mut read: Vec<f32> = [12, 3, 7, 14, 0, 9, 5, 11, 15, 1, 8, 4, 13, 6, 10, 2]
        .iter()
        .map(|&v| v as f32)
        .collect();
    let mut write = vec![0.0; read.len()];

    let expected: [[u8; 16]; 10] = [
        [3, 12, 14, 7, 0, 9, 11, 5, 1, 15, 8, 4, 6, 13, 10, 2],
        [3, 7, 14, 12, 11, 9, 0, 5, 1, 4, 8, 15, 10, 13, 6, 2],
        [3, 7, 12, 14, 11, 9, 5, 0, 1, 4, 8, 15, 13, 10, 6, 2],
        [3, 7, 5, 0, 11, 9, 12, 14, 13, 10, 8, 15, 1, 4, 6, 2],
        [3, 0, 5, 7, 11, 9, 12, 14, 13, 15, 8, 10, 6, 4, 1, 2],
        [0, 3, 5, 7, 9, 11, 12, 14, 15, 13, 10, 8, 6, 4, 2, 1],
        [0, 3, 5, 7, 6, 4, 2, 1, 15, 13, 10, 8, 9, 11, 12, 14],
        [0, 3, 2, 1, 6, 4, 5, 7, 9, 11, 10, 8, 15, 13, 12, 14],
        [0, 1, 2, 3, 5, 4, 6, 7, 9, 8, 10, 11, 12, 13, 15, 14],
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    ];

    let mut passes = 0;
    for (pass, values) in g.passes().zip(&expected) {
        run_pass(&read, &mut write, pass);
        std::mem::swap(&mut read, &mut write);
        passes += 1;
        let want: Vec<f32> = values.iter().map(|&v| f32::from(v)).collect();
        assert_eq!(
            read,
            want,
            "after pass ({}, {})",
            pass.block_step(),
            pass.sub_block_step()
        );
    }

    assert_eq!(passes, 10);
    assert_eq!(g.passes().count(), 10);
}

/// Keeps the full contents of every presented frame.
#[derive(Default)]
struct FrameLog(Vec<(Option<PassDescriptor>, Vec<f32>)>);

impl PresentationSink for FrameLog {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        self.0.push((frame.pass, frame.values.to_vec()));
        Ok(())
    }
}

/// Initial values are `h >> 8` scaled by `2^-24`; these are the numerators.
fn scaled(numerators: &[u32; 16]) -> Vec<f32> {
    numerators.iter().map(|&n| n as f32 / 16_777_216.0).collect()
}

#[test]
fn test_seeded_four_by_four_run() {
    let mut s = SortScheduler::new(HostBackend::new(), FrameLog::default());
    s.reset(2, Seed([12.5, 80.25])).unwrap();
    s.run_animated(Duration::ZERO).unwrap();

    let expected: [[u32; 16]; 11] = [
        [4888819, 65782, 4131890, 15672612, 4696375, 16122265, 8740113, 10738148,
         2661757, 8543523, 10897278, 15900609, 15268415, 5151416, 2694111, 9324219],
        [65782, 4888819, 15672612, 4131890, 4696375, 16122265, 10738148, 8740113,
         2661757, 8543523, 15900609, 10897278, 5151416, 15268415, 9324219, 2694111],
        [65782, 4131890, 15672612, 4888819, 10738148, 16122265, 4696375, 8740113,
         2661757, 8543523, 15900609, 10897278, 9324219, 15268415, 5151416, 2694111],
        [65782, 4131890, 4888819, 15672612, 16122265, 10738148, 8740113, 4696375,
         2661757, 8543523, 10897278, 15900609, 15268415, 9324219, 5151416, 2694111],
        [65782, 4131890, 4888819, 4696375, 16122265, 10738148, 8740113, 15672612,
         15268415, 9324219, 10897278, 15900609, 2661757, 8543523, 5151416, 2694111],
        [65782, 4131890, 4888819, 4696375, 8740113, 10738148, 16122265, 15672612,
         15268415, 15900609, 10897278, 9324219, 5151416, 8543523, 2661757, 2694111],
        [65782, 4131890, 4696375, 4888819, 8740113, 10738148, 15672612, 16122265,
         15900609, 15268415, 10897278, 9324219, 8543523, 5151416, 2694111, 2661757],
        [65782, 4131890, 4696375, 4888819, 8543523, 5151416, 2694111, 2661757,
         15900609, 15268415, 10897278, 9324219, 8740113, 10738148, 15672612, 16122265],
        [65782, 4131890, 2694111, 2661757, 8543523, 5151416, 4696375, 4888819,
         8740113, 10738148, 10897278, 9324219, 15900609, 15268415, 15672612, 16122265],
        [65782, 2661757, 2694111, 4131890, 4696375, 4888819, 8543523, 5151416,
         8740113, 9324219, 10897278, 10738148, 15672612, 15268415, 15900609, 16122265],
        [65782, 2661757, 2694111, 4131890, 4696375, 4888819, 5151416, 8543523,
         8740113, 9324219, 10738148, 10897278, 15268415, 15672612, 15900609, 16122265],
    ];

    let frames = &s.sink().0;
    assert_eq!(frames.len(), expected.len());
    assert_eq!(frames[0].0, None);
    assert_eq!(frames[0].1, scaled(&expected[0]), "initial fill");

    for ((frame, want), pass) in frames[1..].iter().zip(&expected[1..]).zip(grid(2).passes()) {
        assert_eq!(frame.0, Some(pass));
        assert_eq!(
            frame.1,
            scaled(want),
            "after pass ({}, {})",
            pass.block_step(),
            pass.sub_block_step()
        );
    }
    assert!(is_sorted(&frames[10].1));
}

#[test]
fn test_single_element_grid() {
    let (initial, sorted) = sort_on_host(0, Seed([3.0, 4.0]));
    assert_eq!(initial.len(), 1);
    assert_eq!(initial, sorted);
}

#[test]
fn test_two_by_two_grid() {
    let (initial, sorted) = sort_on_host(1, Seed([50.0, 25.0]));
    assert_eq!(sorted.len(), 4);
    assert_sorted_permutation(&initial, &sorted);
}

#[test]
fn test_already_sorted_input_is_stable() {
    let g = grid(3);
    let mut read: Vec<f32> = (0..g.element_count()).map(|i| i as f32 / 64.0).collect();
    let original = read.clone();
    let mut write = vec![0.0; read.len()];
    for pass in g.passes() {
        run_pass(&read, &mut write, pass);
        std::mem::swap(&mut read, &mut write);
    }
    assert_eq!(read, original);
}

#[test]
fn test_duplicates_survive() {
    let g = grid(2);
    let mut read = vec![
        0.5f32, 0.25, 0.5, 0.25, 0.0, 0.5, 0.0, 0.25, 0.5, 0.5, 0.0, 0.0, 0.25, 0.25, 0.5, 0.0,
    ];
    let mut expected = read.clone();
    expected.sort_by(f32::total_cmp);
    let mut write = vec![0.0; read.len()];
    for pass in g.passes() {
        run_pass(&read, &mut write, pass);
        std::mem::swap(&mut read, &mut write);
    }
    assert_eq!(read, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_host_sort_is_sorted_permutation(
        k in 0i64..=5,
        sx in 0.0f32..100.0,
        sy in 0.0f32..100.0,
    ) {
        let (initial, sorted) = sort_on_host(k, Seed([sx, sy]));
        prop_assert!(is_sorted(&sorted));
        assert_sorted_permutation(&initial, &sorted);
    }

    #[test]
    fn prop_partner_is_symmetric(b in 0u32..16, s_off in 0u32..16, index in 0u32..(1 << 16)) {
        let s = s_off % (b + 1);
        let pass = PassDescriptor::new(b, s).unwrap();
        let mine = pass.pairing(index);
        let theirs = pass.pairing(mine.partner);
        prop_assert_eq!(theirs.partner, index);
        prop_assert_ne!(mine.ascending, theirs.ascending);
        prop_assert_eq!(mine.partner ^ index, pass.distance());
    }

    #[test]
    fn prop_pass_count(k in 0i64..=12) {
        let g = grid(k);
        prop_assert_eq!(g.passes().count() as u64, g.total_passes());
        let n = u64::from(g.size_n());
        prop_assert_eq!(g.total_passes(), n * (n + 1) / 2);
    }
}
