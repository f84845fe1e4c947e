use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Cancellation and suspension flags shared between the scan thread and the
/// threads issuing commands.
///
/// Cancellation ends the run after the in-flight cluster. Suspension parks the run
/// between clusters until it is lifted or the run is cancelled.
#[derive(Default)]
pub struct ScanControl {
    cancelled: AtomicBool,
    /// Set when cancellation came from a user pause, so the run checkpoints on exit.
    paused: AtomicBool,
    running: AtomicBool,
    suspended: Mutex<bool>,
    wake: Condvar,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.cancel();
    }

    /// Clear cancellation before a new run. Thermal suspension is left alone.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn suspend(&self) {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.wake.notify_all();
    }

    pub fn is_suspended(&self) -> bool {
        *self.suspended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block while suspended. Returns false if the run was cancelled meanwhile.
    pub fn wait_while_suspended(&self) -> bool {
        let guard = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .wake
            .wait_while(guard, |suspended| *suspended && !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        !self.is_cancelled()
    }

    fn notify(&self) {
        // Taking the lock orders this wake-up after a waiter's predicate check.
        let _guard = self.suspended.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_not_suspended_passes_through() {
        let control = ScanControl::new();
        assert!(control.wait_while_suspended());
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let control = Arc::new(ScanControl::new());
        control.suspend();
        let waiter = {
            let control = Arc::clone(&control);
            std::thread::spawn(move || control.wait_while_suspended())
        };
        std::thread::sleep(Duration::from_millis(50));
        control.resume();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let control = Arc::new(ScanControl::new());
        control.suspend();
        let waiter = {
            let control = Arc::clone(&control);
            std::thread::spawn(move || control.wait_while_suspended())
        };
        std::thread::sleep(Duration::from_millis(50));
        control.cancel();
        assert!(!waiter.join().unwrap());
        assert!(control.is_suspended());
    }

    #[test]
    fn test_reset_keeps_suspension() {
        let control = ScanControl::new();
        control.suspend();
        control.pause();
        assert!(control.is_paused() && control.is_cancelled());
        control.reset();
        assert!(!control.is_paused() && !control.is_cancelled());
        assert!(control.is_suspended());
    }
}
