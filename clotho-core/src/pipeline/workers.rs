//! Scoped worker pool for per-record jobs.
//!
//! Jobs are pushed onto a `crossbeam-channel` queue and drained by
//! `nb_workers` scoped threads. The first failing job sets an abort flag;
//! workers then drain the remaining jobs without running them, and the first
//! error is returned once every thread has joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use tracing::{debug, Span};

use crate::error::{ClothoError, Result};

/// Run `work` on every job, stopping at the first error.
///
/// With `nb_workers <= 1` (or a single job) everything runs on the calling
/// thread, in order.
pub fn for_each_job<T, F>(nb_workers: usize, jobs: Vec<T>, work: F) -> Result<()>
where
    T: Send,
    F: Fn(T) -> Result<()> + Sync,
{
    if nb_workers <= 1 || jobs.len() <= 1 {
        return jobs.into_iter().try_for_each(work);
    }

    let workers = nb_workers.min(jobs.len());
    let (tx, rx) = unbounded::<T>();
    for job in jobs {
        // The receiver outlives this loop, so sending cannot fail.
        let _ = tx.send(job);
    }
    drop(tx);

    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<ClothoError>> = Mutex::new(None);
    let parent = Span::current();

    thread::scope(|scope| {
        for worker in 0..workers {
            let rx = rx.clone();
            let (abort, first_error, work, parent) = (&abort, &first_error, &work, &parent);
            scope.spawn(move || {
                let _entered = parent.enter();
                let mut done = 0usize;
                for job in rx.iter() {
                    if abort.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(e) = work(job) {
                        abort.store(true, Ordering::Relaxed);
                        first_error.lock().get_or_insert(e);
                    } else {
                        done += 1;
                    }
                }
                debug!(worker, jobs = done, "worker finished");
            });
        }
    });

    match first_error.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_every_job_once() {
        let sum = AtomicUsize::new(0);
        let jobs: Vec<usize> = (1..=100).collect();
        for_each_job(4, jobs, |n| {
            sum.fetch_add(n, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(sum.load(Ordering::Relaxed), 5050);
    }

    #[test]
    fn inline_mode_preserves_order() {
        let seen = Mutex::new(Vec::new());
        for_each_job(1, vec![3, 1, 2], |n| {
            seen.lock().push(n);
            Ok(())
        })
        .unwrap();
        assert_eq!(*seen.lock(), vec![3, 1, 2]);
    }

    #[test]
    fn first_error_is_returned_and_rest_skipped() {
        let ran = AtomicUsize::new(0);
        let err = for_each_job(1, (0..10).collect(), |n: i32| {
            ran.fetch_add(1, Ordering::Relaxed);
            if n == 2 {
                Err(ClothoError::Config(format!("job {n} failed")))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("job 2 failed"));
        assert_eq!(ran.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn parallel_error_aborts_pool() {
        let ran = AtomicUsize::new(0);
        let result = for_each_job(3, (0..1_000).collect(), |n: i32| {
            ran.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                Err(ClothoError::Config("boom".into()))
            } else {
                std::thread::sleep(std::time::Duration::from_micros(50));
                Ok(())
            }
        });
        assert!(result.is_err());
        assert!(ran.load(Ordering::Relaxed) < 1_000);
    }
}
