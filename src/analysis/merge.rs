//! Pairwise shard merge tree (§4.6 step 6): reduce every scan worker's
//! shard down to one surviving table by repeatedly merging the smaller
//! of two shards into the larger, using `rayon::scope` plus a shared
//! worklist guarded by a `parking_lot::Mutex` — the same pairwise-
//! reduction shape as the teacher's work-stealing scheduler.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::Shard;
use crate::error::{KmerError, KmerResult};

fn merge_pair(a: Shard, b: Shard) -> KmerResult<Shard> {
    let (mut larger, smaller) = if a.file_size()? >= b.file_size()? {
        (a, b)
    } else {
        (b, a)
    };
    larger.merge_from(smaller)?;
    Ok(larger)
}

fn merge_sequential(mut shards: Vec<Shard>, cancelled: &AtomicBool) -> KmerResult<Shard> {
    while shards.len() > 1 {
        if cancelled.load(Ordering::Relaxed) {
            return Err(KmerError::Cancelled);
        }
        let a = shards.pop().unwrap();
        let b = shards.pop().unwrap();
        shards.push(merge_pair(a, b)?);
    }
    Ok(shards.pop().unwrap())
}

fn merge_parallel(shards: Vec<Shard>, worker_count: usize, cancelled: &AtomicBool) -> KmerResult<Shard> {
    let worklist = Mutex::new(shards);
    let error: Mutex<Option<KmerError>> = Mutex::new(None);

    rayon::scope(|s| {
        for _ in 0..worker_count {
            s.spawn(|_| loop {
                if cancelled.load(Ordering::Relaxed) || error.lock().is_some() {
                    break;
                }
                let pair = {
                    let mut guard = worklist.lock();
                    if guard.len() < 2 {
                        None
                    } else {
                        let a = guard.pop().unwrap();
                        let b = guard.pop().unwrap();
                        Some((a, b))
                    }
                };
                match pair {
                    None => {
                        if worklist.lock().len() <= 1 {
                            break;
                        }
                        std::thread::yield_now();
                    }
                    Some((a, b)) => match merge_pair(a, b) {
                        Ok(survivor) => worklist.lock().push(survivor),
                        Err(e) => {
                            *error.lock() = Some(e);
                            break;
                        }
                    },
                }
            });
        }
    });

    if let Some(e) = error.into_inner() {
        return Err(e);
    }
    if cancelled.load(Ordering::Relaxed) {
        return Err(KmerError::Cancelled);
    }

    let mut remaining = worklist.into_inner();
    if remaining.len() != 1 {
        return Err(KmerError::InvalidInput(format!(
            "merge tree ended with {} shards instead of 1",
            remaining.len()
        )));
    }
    Ok(remaining.pop().unwrap())
}

/// Merge every shard in `shards` down to a single survivor. `worker_count
/// == 0` runs the reduction inline on the calling thread; otherwise up to
/// `worker_count` rayon tasks race over a shared worklist.
pub(crate) fn merge_tree(
    mut shards: Vec<Shard>,
    worker_count: usize,
    cancelled: &AtomicBool,
) -> KmerResult<Shard> {
    if shards.is_empty() {
        return Err(KmerError::InvalidInput(
            "merge_tree requires at least one shard".to_string(),
        ));
    }
    if shards.len() == 1 {
        return Ok(shards.pop().unwrap());
    }
    if worker_count == 0 {
        merge_sequential(shards, cancelled)
    } else {
        merge_parallel(shards, worker_count, cancelled)
    }
}
