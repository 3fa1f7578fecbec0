use crate::core::SimulationSpace;
use crate::error::SyncError;
use crate::Result;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Drives a `SimulationSpace` from a dedicated fixed-tick thread
///
/// The thread feeds wall-clock time into `SimulationSpace::update` and
/// sleeps out the remainder of each period. Dropping the runner stops and
/// joins the thread.
pub struct SpaceRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SpaceRunner {
    /// Spawns the simulation thread stepping at the space's fixed rate
    pub fn start(space: Arc<SimulationSpace>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let period = Duration::from_secs_f32(space.get_config().time_step);

        let handle = std::thread::Builder::new()
            .name("simulation".into())
            .spawn(move || {
                let mut last = Instant::now();
                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    space.update((now - last).as_secs_f32());
                    last = now;

                    let spent = now.elapsed();
                    if spent < period {
                        std::thread::sleep(period - spent);
                    }
                }
            })
            .map_err(|err| SyncError::Thread(err.to_string()))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Returns whether the simulation thread is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the simulation thread and waits for it to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("simulation thread panicked");
            }
        }
    }
}

impl Drop for SpaceRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
