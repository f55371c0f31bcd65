//! Completion dispatch.
//!
//! Pipelines hand finished requests to a [`Dispatcher`] while still inside
//! their critical section; handing off is a non-blocking queue push, so the
//! hand-off order is the submission order. The callback itself runs later on
//! a worker thread, after the section has been released.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;

use tracing::{error, warn};

use crate::config::DispatchMode;

/// A callback bound to its result, ready to run.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue feeding one or more completion workers.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    jobs: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Dispatchers for the send and receive directions.
    ///
    /// Ordered mode gives each direction its own worker; pooled mode shares
    /// one pool between them.
    pub(crate) fn for_channel(mode: DispatchMode) -> std::io::Result<(Self, Self)> {
        match mode {
            DispatchMode::Ordered => Ok((
                Self::ordered("linesock-send-done")?,
                Self::ordered("linesock-recv-done")?,
            )),
            DispatchMode::Pooled { workers } => {
                let pool = Self::pooled("linesock-done", workers)?;
                Ok((pool.clone(), pool))
            }
        }
    }

    /// A single worker: jobs run one at a time, in hand-off order.
    pub(crate) fn ordered(name: &str) -> std::io::Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in queue {
                    run(job);
                }
            })?;
        Ok(Self { jobs })
    }

    /// `workers` threads pulling from one queue.
    pub(crate) fn pooled(name: &str, workers: usize) -> std::io::Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(queue));

        for i in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    match next {
                        Ok(job) => run(job),
                        Err(_) => break,
                    }
                })?;
        }
        Ok(Self { jobs })
    }

    /// Queue `job` to run on a worker. Never runs it inline.
    pub(crate) fn dispatch(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            error!("completion workers exited; dropping callback");
        }
    }
}

fn run(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!("completion callback panicked");
    }
}
