use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// No document open and no request in flight.
    Closed,
    /// The worker is producing, or about to.
    Active,
    /// The worker finished producing for the current request.
    Complete,
    /// A hard stop was requested; the worker closes the document and goes
    /// back to `Closed`.
    Cancelled,
}

impl RequestStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RequestStatus::Active,
            2 => RequestStatus::Complete,
            3 => RequestStatus::Cancelled,
            _ => RequestStatus::Closed,
        }
    }
}

/// Atomic status register.
///
/// Every ordinary change is a compare-and-swap along one of the edges of the
/// state machine; only [`AtomicStatus::force`] stores unconditionally.
#[derive(Debug)]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(RequestStatus::Closed as u8))
    }

    pub(crate) fn get(&self) -> RequestStatus {
        RequestStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Swap `from` for `to` if the current value is `from`.
    ///
    /// Returns the value observed before the call; the swap happened when it
    /// equals `from`.
    pub(crate) fn transition(&self, from: RequestStatus, to: RequestStatus) -> RequestStatus {
        debug_assert!(is_edge(from, to), "{from:?} -> {to:?} is not a status edge");
        match self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(prev) | Err(prev) => RequestStatus::from_u8(prev),
        }
    }

    /// Store `to` regardless of the current value; returns the previous one.
    /// Only the hard abort uses this.
    pub(crate) fn force(&self, to: RequestStatus) -> RequestStatus {
        RequestStatus::from_u8(self.0.swap(to as u8, Ordering::AcqRel))
    }
}

/// The compare-and-swap edges of the request state machine.
pub(crate) fn is_edge(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Closed, Active)
            | (Active, Complete)
            | (Active, Cancelled)
            | (Cancelled, Closed)
            | (Complete, Active)
    )
}

#[cfg(test)]
mod tests {
    use super::RequestStatus::*;
    use super::*;

    #[test]
    fn transition_only_applies_on_matching_state() {
        let status = AtomicStatus::new();
        assert_eq!(status.transition(Active, Complete), Closed);
        assert_eq!(status.get(), Closed);
        assert_eq!(status.transition(Closed, Active), Closed);
        assert_eq!(status.get(), Active);
        assert_eq!(status.transition(Active, Cancelled), Active);
        assert_eq!(status.get(), Cancelled);
        assert_eq!(status.transition(Cancelled, Closed), Cancelled);
        assert_eq!(status.get(), Closed);
    }

    #[test]
    fn force_overrides_any_state() {
        let status = AtomicStatus::new();
        status.transition(Closed, Active);
        status.transition(Active, Complete);
        assert_eq!(status.force(Cancelled), Complete);
        assert_eq!(status.get(), Cancelled);
    }

    // Drive the register with a long pseudo-random sequence of events and
    // check every observed change is an edge of the state machine.
    #[test]
    fn random_event_sequences_stay_on_edges() {
        #[derive(Clone, Copy)]
        enum Event {
            Arm,
            Finish,
            Stop,
            Abort,
            Reap,
            Continue,
        }
        let events = [
            Event::Arm,
            Event::Finish,
            Event::Stop,
            Event::Abort,
            Event::Reap,
            Event::Continue,
        ];

        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _run in 0..64 {
            let status = AtomicStatus::new();
            for _step in 0..256 {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let event = events[(seed % events.len() as u64) as usize];
                let before = status.get();
                match event {
                    Event::Arm => {
                        status.transition(Closed, Active);
                    }
                    Event::Finish => {
                        status.transition(Active, Complete);
                    }
                    Event::Stop => {
                        status.transition(Active, Cancelled);
                    }
                    Event::Reap => {
                        status.transition(Cancelled, Closed);
                    }
                    Event::Continue => {
                        status.transition(Complete, Active);
                    }
                    Event::Abort => {
                        status.force(Cancelled);
                    }
                }
                let after = status.get();
                let legal = before == after
                    || is_edge(before, after)
                    || (matches!(event, Event::Abort) && after == Cancelled);
                assert!(legal, "{before:?} -> {after:?}");
            }
        }
    }
}
