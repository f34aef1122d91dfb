//! Parallel processing utilities
//!
//! Independent units of work (one learner fit, one candidate/partition
//! score) run on rayon's pool or sequentially. Results always come back in
//! input order, and when several units fail the lowest-indexed error wins,
//! so the outcome never depends on scheduling.

use crate::error::Result;
use rayon::prelude::*;

/// Map `f` over `items`, failing if any call fails
pub fn try_map<T, U, F>(items: &[T], parallel: bool, f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(usize, &T) -> Result<U> + Send + Sync,
{
    let results: Vec<Result<U>> = if parallel {
        items.par_iter().enumerate().map(|(i, item)| f(i, item)).collect()
    } else {
        items.iter().enumerate().map(|(i, item)| f(i, item)).collect()
    };
    results.into_iter().collect()
}

/// Run `f` on every item in place, failing if any call fails
pub fn try_for_each_mut<T, F>(items: &mut [T], parallel: bool, f: F) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut T) -> Result<()> + Send + Sync,
{
    let results: Vec<Result<()>> = if parallel {
        items
            .par_iter_mut()
            .enumerate()
            .map(|(i, item)| f(i, item))
            .collect()
    } else {
        items.iter_mut().enumerate().map(|(i, item)| f(i, item)).collect()
    };
    results.into_iter().collect()
}
