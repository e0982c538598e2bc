//! Requests accepted on stdin, one JSON object tagged by `cmd`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::init::Seed;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Gpu,
    Host,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    /// Reset, then sort back to back and time it.
    Batch {
        #[serde(default = "default_batch_exponent")]
        size_exponent: i64,
        #[serde(default)]
        seed: Option<Seed>,
        #[serde(default)]
        backend: BackendKind,
        #[serde(default)]
        image: Option<PathBuf>,
    },
    /// Reset, then run one pass per tick and report every frame.
    Animate {
        #[serde(default = "default_animate_exponent")]
        size_exponent: i64,
        #[serde(default)]
        seed: Option<Seed>,
        #[serde(default)]
        backend: BackendKind,
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
        #[serde(default)]
        image: Option<PathBuf>,
    },
    /// Sort each size on the GPU and on the host and compare the results.
    Verify {
        #[serde(default = "default_verify_sizes")]
        sizes: Vec<i64>,
        #[serde(default)]
        seed: Option<Seed>,
    },
}

impl Default for Request {
    fn default() -> Self {
        Request::Batch {
            size_exponent: default_batch_exponent(),
            seed: None,
            backend: BackendKind::default(),
            image: None,
        }
    }
}

impl Request {
    /// Empty input means a default batch run.
    pub fn parse(input: &str) -> serde_json::Result<Self> {
        if input.trim().is_empty() {
            Ok(Request::default())
        } else {
            serde_json::from_str(input)
        }
    }
}

fn default_batch_exponent() -> i64 { 8 }
fn default_animate_exponent() -> i64 { 4 }
fn default_interval_ms() -> u64 { 100 }
fn default_verify_sizes() -> Vec<i64> { vec![0, 1, 2, 4, 6, 8] }
