//! Selection rules over a candidate x partition score matrix

use crate::error::{KolosalError, Result};
use ndarray::{Array2, ArrayView1, Axis};

/// Scores of every candidate (rows) on every partition (columns)
pub type ScoreMatrix = Array2<f64>;

/// Picks the winning candidate from a score matrix. Higher scores are better.
pub trait SelectionRule: Send + Sync {
    fn select(&self, scores: &ScoreMatrix) -> Result<usize>;
}

impl<F> SelectionRule for F
where
    F: Fn(&ScoreMatrix) -> Result<usize> + Send + Sync,
{
    fn select(&self, scores: &ScoreMatrix) -> Result<usize> {
        self(scores)
    }
}

/// Highest mean score across partitions
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMean;

/// Highest median score across partitions
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMedian;

/// Highest minimum score across partitions
#[derive(Debug, Clone, Copy, Default)]
pub struct BestWorstCase;

impl SelectionRule for BestMean {
    fn select(&self, scores: &ScoreMatrix) -> Result<usize> {
        argmax_rows(scores, |row| row.sum() / row.len() as f64)
    }
}

impl SelectionRule for BestMedian {
    fn select(&self, scores: &ScoreMatrix) -> Result<usize> {
        argmax_rows(scores, |row| {
            let mut sorted = row.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        })
    }
}

impl SelectionRule for BestWorstCase {
    fn select(&self, scores: &ScoreMatrix) -> Result<usize> {
        argmax_rows(scores, |row| row.fold(f64::INFINITY, |acc, &s| acc.min(s)))
    }
}

/// Index of the row with the largest summary. Ties go to the lowest index
/// and rows whose summary is not finite never win.
fn argmax_rows<F>(scores: &ScoreMatrix, summary: F) -> Result<usize>
where
    F: Fn(ArrayView1<f64>) -> f64,
{
    if scores.nrows() == 0 || scores.ncols() == 0 {
        return Err(KolosalError::ValidationError(format!(
            "Cannot select from an empty {}x{} score matrix",
            scores.nrows(),
            scores.ncols()
        )));
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, row) in scores.axis_iter(Axis(0)).enumerate() {
        let value = summary(row);
        if !value.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((idx, value));
        }
    }

    best.map(|(idx, _)| idx).ok_or_else(|| {
        KolosalError::ValidationError("Every candidate has a non-finite score".to_string())
    })
}
