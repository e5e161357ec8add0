//! Stop token and pause gate shared between the engine and a running script.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Raised at a checkpoint once stop has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

#[derive(Debug, Default)]
struct Flags {
    stop: bool,
    paused: bool,
}

/// Cooperative control block. Stop is one-shot until `reset`.
#[derive(Debug, Default)]
pub struct Control {
    flags: Mutex<Flags>,
    cv: Condvar,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both signals. Called before a new execution starts.
    pub fn reset(&self) {
        let mut f = self.flags.lock();
        f.stop = false;
        f.paused = false;
    }

    /// Raise stop and release any pause-block.
    pub fn request_stop(&self) {
        let mut f = self.flags.lock();
        f.stop = true;
        f.paused = false;
        self.cv.notify_all();
    }

    pub fn pause(&self) {
        self.flags.lock().paused = true;
    }

    pub fn resume(&self) {
        let mut f = self.flags.lock();
        f.paused = false;
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.lock().stop
    }

    /// Fail on stop, block while paused.
    pub fn checkpoint(&self) -> Result<(), Stopped> {
        let mut f = self.flags.lock();
        loop {
            if f.stop {
                return Err(Stopped);
            }
            if !f.paused {
                return Ok(());
            }
            self.cv.wait(&mut f);
        }
    }

    /// Sleep `total`, waking at least every `slice` to honour stop and pause.
    ///
    /// Time spent paused does not count against `total`.
    pub fn sleep(&self, total: Duration, slice: Duration) -> Result<(), Stopped> {
        let mut remaining = total;
        loop {
            self.checkpoint()?;
            if remaining.is_zero() {
                return Ok(());
            }
            let step = remaining.min(slice);
            let started = Instant::now();
            {
                let mut f = self.flags.lock();
                if !f.stop && !f.paused {
                    // stop/resume notify, so the wait ends early on stop
                    self.cv.wait_for(&mut f, step);
                }
            }
            remaining = remaining.saturating_sub(started.elapsed().min(step));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn checkpoint_passes_when_clear() {
        let c = Control::new();
        assert_eq!(c.checkpoint(), Ok(()));
    }

    #[test]
    fn stop_is_sticky_until_reset() {
        let c = Control::new();
        c.request_stop();
        assert_eq!(c.checkpoint(), Err(Stopped));
        assert_eq!(c.checkpoint(), Err(Stopped));
        c.reset();
        assert_eq!(c.checkpoint(), Ok(()));
    }

    #[test]
    fn pause_blocks_until_resume() {
        let c = Arc::new(Control::new());
        c.pause();
        let worker = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                let t = Instant::now();
                c.checkpoint().map(|_| t.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(80));
        c.resume();
        let waited = worker.join().unwrap().unwrap();
        assert!(waited >= Duration::from_millis(60));
    }

    #[test]
    fn stop_releases_a_paused_checkpoint() {
        let c = Arc::new(Control::new());
        c.pause();
        let worker = {
            let c = Arc::clone(&c);
            thread::spawn(move || c.checkpoint())
        };
        thread::sleep(Duration::from_millis(30));
        c.request_stop();
        assert_eq!(worker.join().unwrap(), Err(Stopped));
    }

    #[test]
    fn long_sleep_is_cut_short_by_stop() {
        let c = Arc::new(Control::new());
        let worker = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                let t = Instant::now();
                let r = c.sleep(Duration::from_secs(60), Duration::from_millis(100));
                (r, t.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        c.request_stop();
        let (r, took) = worker.join().unwrap();
        assert_eq!(r, Err(Stopped));
        assert!(took < Duration::from_millis(500));
    }

    #[test]
    fn short_sleep_completes() {
        let c = Control::new();
        let t = Instant::now();
        assert_eq!(c.sleep(Duration::from_millis(120), Duration::from_millis(50)), Ok(()));
        assert!(t.elapsed() >= Duration::from_millis(110));
    }
}
