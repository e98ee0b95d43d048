//! Cooperative stop requests.
//!
//! A `StopHandle` is a shared flag the run loop checks between cycles. The Ctrl+C handler
//! is installed once per process and fans the signal out to every registered handle, so
//! interrupts travel the same teardown path as end-of-stream and quit keys.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once, Weak};

#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pipeline to stop after the current cycle.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the handle can drive another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

static CTRL_HANDLER: Once = Once::new();
static REGISTERED: Mutex<Vec<Weak<AtomicBool>>> = Mutex::new(Vec::new());

/// Route Ctrl+C (SIGINT/SIGTERM) to `handle`. Safe to call for any number of handles.
pub fn install_interrupt_handler(handle: &StopHandle) {
    if let Ok(mut handles) = REGISTERED.lock() {
        handles.retain(|weak| weak.strong_count() > 0);
        handles.push(Arc::downgrade(&handle.flag));
    }
    CTRL_HANDLER.call_once(|| {
        if let Err(err) = ctrlc::set_handler(|| {
            log::info!("interrupt received; stopping pipeline");
            signal_all();
        }) {
            log::warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}

fn signal_all() {
    if let Ok(handles) = REGISTERED.lock() {
        for flag in handles.iter().filter_map(Weak::upgrade) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_stopped());
        clone.stop();
        assert!(handle.is_stopped());
        handle.reset();
        assert!(!clone.is_stopped());
    }

    #[test]
    fn registered_handles_receive_signals() {
        let first = StopHandle::new();
        let second = StopHandle::new();
        install_interrupt_handler(&first);
        install_interrupt_handler(&second);
        signal_all();
        assert!(first.is_stopped());
        assert!(second.is_stopped());
    }
}
