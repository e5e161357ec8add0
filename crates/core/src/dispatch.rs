use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::logger;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget job queue drained by one worker thread.
///
/// `submit` never blocks: when the queue is full the job is dropped and a
/// warning is logged. The worker exits once the dispatcher is dropped.
pub struct Dispatcher {
    name: String,
    tx: Sender<Job>,
}

impl Dispatcher {
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        let (tx, rx) = bounded::<Job>(capacity.max(1));
        thread::Builder::new()
            .name(format!("{}-dispatch", name))
            .spawn(move || {
                for job in rx {
                    job();
                }
            })
            .with_context(|| format!("spawning {} dispatch worker", name))?;
        Ok(Self { name: name.to_string(), tx })
    }

    /// Queue a job. Returns false if it was dropped.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match self.tx.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                logger::warn_p(&self.name, "dispatch queue full, dropping job");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                logger::error_p(&self.name, "dispatch worker is gone");
                false
            }
        }
    }
}
