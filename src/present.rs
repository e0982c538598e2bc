//! Presentation of buffer contents. Sinks observe frames; they never feed
//! anything back into the sort.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::error::SortError;
use crate::grid::{GridSize, PassDescriptor};

/// The front buffer as of some point in a run.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub grid: GridSize,
    /// The pass that produced this frame, `None` after reset or a batch run.
    pub pass: Option<PassDescriptor>,
    pub draw_calls: u64,
    pub values: &'a [f32],
}

pub trait PresentationSink {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError>;
}

impl<S: PresentationSink + ?Sized> PresentationSink for &mut S {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        (**self).present(frame)
    }
}

impl<S: PresentationSink> PresentationSink for Option<S> {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        match self {
            Some(sink) => sink.present(frame),
            None => Ok(()),
        }
    }
}

impl<A: PresentationSink, B: PresentationSink> PresentationSink for (A, B) {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        self.0.present(frame)?;
        self.1.present(frame)
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn present(&mut self, _frame: &Frame<'_>) -> Result<(), SortError> {
        Ok(())
    }
}

pub fn is_sorted(values: &[f32]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSummary {
    pub pass: Option<PassDescriptor>,
    pub draw_calls: u64,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// Elements at indices 0, 1, min(10, n-1) and n-1.
    pub sample: [f32; 4],
    pub sorted: bool,
}

impl FrameSummary {
    pub fn of(frame: &Frame<'_>) -> Self {
        let values = frame.values;
        let (mut min, mut max, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f64);
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
        }
        let last = values.len().saturating_sub(1);
        let at = |i: usize| values.get(i.min(last)).copied().unwrap_or(0.0);
        FrameSummary {
            pass: frame.pass,
            draw_calls: frame.draw_calls,
            min,
            max,
            mean: (sum / values.len().max(1) as f64) as f32,
            sample: [at(0), at(1), at(10), at(last)],
            sorted: is_sorted(values),
        }
    }
}

/// Keeps the latest summary, optionally every summary.
#[derive(Debug, Default)]
pub struct SummarySink {
    last: Option<FrameSummary>,
    history: Option<Vec<FrameSummary>>,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording() -> Self {
        Self {
            last: None,
            history: Some(Vec::new()),
        }
    }

    pub fn last(&self) -> Option<&FrameSummary> {
        self.last.as_ref()
    }

    pub fn take_history(&mut self) -> Vec<FrameSummary> {
        self.history.as_mut().map(std::mem::take).unwrap_or_default()
    }
}

impl PresentationSink for SummarySink {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        let summary = FrameSummary::of(frame);
        log::debug!(
            "frame {:?}: draw_calls={} min={} max={} sorted={}",
            summary.pass,
            summary.draw_calls,
            summary.min,
            summary.max,
            summary.sorted
        );
        if let Some(history) = &mut self.history {
            history.push(summary.clone());
        }
        self.last = Some(summary);
        Ok(())
    }
}

/// Writes each frame as an 8-bit binary PGM, overwriting the file. Row
/// `side - 1` of the grid is the top row of the image.
#[derive(Debug)]
pub struct PgmSink {
    path: PathBuf,
}

impl PgmSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn encode(frame: &Frame<'_>) -> Vec<u8> {
        let side = frame.grid.side() as usize;
        let mut out = format!("P5\n{side} {side}\n255\n").into_bytes();
        out.reserve(side * side);
        for y in (0..side).rev() {
            for &v in &frame.values[y * side..(y + 1) * side] {
                out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        out
    }
}

impl PresentationSink for PgmSink {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), SortError> {
        let write = || -> std::io::Result<()> {
            let mut file = BufWriter::new(File::create(&self.path)?);
            file.write_all(&Self::encode(frame))?;
            file.flush()
        };
        write().map_err(|err| SortError::Present(format!("{}: {err}", self.path.display())))
    }
}
