use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Binary signal with auto-reset semantics.
///
/// `set` wakes one waiter; a successful `wait` consumes the signal so the
/// next wait blocks again. A signal raised while nobody waits stays pending
/// until the next wait or an explicit `reset`.
#[derive(Debug, Default)]
pub(crate) struct Event {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cond.notify_one();
    }

    pub(crate) fn reset(&self) {
        *self.raised.lock() = false;
    }

    /// Wait until the signal is raised or `timeout` expires. `None` waits
    /// forever. Returns `true` if the signal was consumed.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut raised = self.raised.lock();
        match timeout {
            None => {
                while !*raised {
                    self.cond.wait(&mut raised);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*raised {
                    if self.cond.wait_until(&mut raised, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        std::mem::replace(&mut *raised, false)
    }

    /// Wait for this signal with an absolute deadline.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let timeout = deadline.saturating_duration_since(Instant::now());
        self.wait(Some(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pending_signal_is_consumed_once() {
        let event = Event::new();
        event.set();
        assert!(event.wait(Some(Duration::from_millis(1))));
        assert!(!event.wait(Some(Duration::from_millis(10))));
    }

    #[test]
    fn reset_clears_a_pending_signal() {
        let event = Event::new();
        event.set();
        event.reset();
        assert!(!event.wait(Some(Duration::from_millis(10))));
    }

    #[test]
    fn set_from_another_thread_wakes_waiter() {
        let event = Arc::new(Event::new());
        let setter = Arc::clone(&event);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        assert!(event.wait(None));
        handle.join().unwrap();
    }
}
