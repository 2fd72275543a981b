// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size worker pool for transaction execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send>;

/// Fixed worker pool over a crossbeam channel.
///
/// Jobs are submit-and-forget: no return futures, no per-task timeout, no
/// cancellation. Dropping the pool closes the channel and joins the workers
/// after the queued jobs drain.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Spawns `count` workers.
    pub fn new(count: usize) -> Self {
        let (sender, receiver) = channel::unbounded::<Job>();
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..count)
            .map(|_| {
                let receiver = receiver.clone();
                let active = Arc::clone(&active);
                thread::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        debug!(workers = count, "thread pool started");
        Self {
            sender: Some(sender),
            workers,
            active,
        }
    }

    /// Submits a job. Never blocks the caller.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.active.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Jobs submitted but not yet finished (queued plus running).
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Hang up; workers drain the queue and exit on channel close.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
