//! Request state shared between the caller and the extraction worker.
//!
//! The caller (consumer) arms a [`Request`] and raises the producer signal;
//! the worker (producer) fills the request and raises the consumer signal.
//! All request fields live behind one mutex; the status register and the
//! signals are usable without it.

use crate::buffer::{encode_filtered, RequestBuffer};
use crate::signal::Event;
use crate::status::{AtomicStatus, RequestStatus};
use crate::{ExtractError, Field, FieldKind, Result, ResultTag, Scalar, Timeouts};
use parking_lot::{Mutex, MutexGuard};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// ── Request ──────────────────────────────────────────────────────────────────

/// One extraction request and its result.
#[derive(Debug)]
pub(crate) struct Request {
    /// Target document; `None` tells the worker to close whatever it has.
    pub(crate) path: Option<PathBuf>,
    pub(crate) field: Field,
    /// `0` starts a new extraction, `> 0` asks for the next chunk of a
    /// streaming field.
    pub(crate) unit: i32,
    pub(crate) flags: u32,
    /// How long a streaming worker waits for the consumer to pick up a full
    /// buffer before it gives up.
    pub(crate) timeout: Duration,
    pub(crate) tag: ResultTag,
    pub(crate) scalar: Scalar,
    pub(crate) buffer: RequestBuffer,
}

impl Request {
    fn new(capacity: usize) -> Self {
        Self {
            path: None,
            field: Field::Title,
            unit: 0,
            flags: 0,
            timeout: Duration::ZERO,
            tag: ResultTag::Empty,
            scalar: Scalar::None,
            buffer: RequestBuffer::new(capacity),
        }
    }
}

/// Result of waiting for the other side of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Signalled,
    TimedOut,
    /// The worker is not running.
    Failed,
}

/// Whether an armed request needs the worker or can be answered from data
/// already in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Armed {
    /// The buffer is empty, the worker has to produce.
    NeedsWorker,
    /// A continuation found unread text in the buffer.
    Buffered,
}

// ── RequestChannel ───────────────────────────────────────────────────────────

/// Synchronisation hub of one extraction pipeline.
pub(crate) struct RequestChannel {
    request: Mutex<Request>,
    status: AtomicStatus,
    /// Worker thread run flag, distinct from the request status.
    active: AtomicBool,
    document_open: AtomicBool,
    no_cache: AtomicBool,
    producer: Event,
    consumer: Event,
    exited: Event,
    thread: Mutex<Option<JoinHandle<()>>>,
    timeouts: Timeouts,
}

impl RequestChannel {
    pub(crate) fn new(timeouts: Timeouts, capacity: usize, no_cache: bool) -> Self {
        Self {
            request: Mutex::new(Request::new(capacity)),
            status: AtomicStatus::new(),
            active: AtomicBool::new(false),
            document_open: AtomicBool::new(false),
            no_cache: AtomicBool::new(no_cache),
            producer: Event::new(),
            consumer: Event::new(),
            exited: Event::new(),
            thread: Mutex::new(None),
            timeouts,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Request> {
        self.request.lock()
    }

    pub(crate) fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub(crate) fn status(&self) -> RequestStatus {
        self.status.get()
    }

    pub(crate) fn transition(&self, from: RequestStatus, to: RequestStatus) -> RequestStatus {
        self.status.transition(from, to)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn is_document_open(&self) -> bool {
        self.document_open.load(Ordering::Acquire)
    }

    pub(crate) fn set_document_open(&self, open: bool) {
        self.document_open.store(open, Ordering::Release);
    }

    pub(crate) fn no_cache(&self) -> bool {
        self.no_cache.load(Ordering::Relaxed)
    }

    pub(crate) fn set_no_cache(&self, no_cache: bool) {
        self.no_cache.store(no_cache, Ordering::Relaxed);
    }

    // ── Signals ──────────────────────────────────────────────────────────────

    pub(crate) fn wait_for_producer(&self, timeout: Option<Duration>) -> bool {
        self.producer.wait(timeout)
    }

    pub(crate) fn wait_for_consumer(&self, timeout: Duration) -> bool {
        self.consumer.wait(Some(timeout))
    }

    pub(crate) fn reset_producer(&self) {
        self.producer.reset();
    }

    pub(crate) fn notify_consumer(&self) {
        self.consumer.set();
    }

    /// Raise the producer signal and wait for the worker's answer.
    ///
    /// A consumer signal left over from an earlier request is dropped first.
    /// On timeout the producer signal is withdrawn so a worker that did not
    /// pick it up yet waits for the next call instead.
    pub(crate) fn notify_producer_wait_for_consumer(&self, timeout: Duration) -> WaitOutcome {
        if !self.is_active() {
            return WaitOutcome::Failed;
        }
        self.consumer.reset();
        self.producer.set();
        if self.consumer.wait(Some(timeout)) {
            WaitOutcome::Signalled
        } else {
            self.producer.reset();
            WaitOutcome::TimedOut
        }
    }

    /// Wake both workers of a comparison and wait until both answered,
    /// sharing one deadline.
    pub(crate) fn compare_wait_for_consumers(&self, other: &RequestChannel, timeout: Duration) -> WaitOutcome {
        if !self.is_active() || !other.is_active() {
            return WaitOutcome::Failed;
        }
        self.consumer.reset();
        other.consumer.reset();
        self.producer.set();
        other.producer.set();

        let deadline = Instant::now() + timeout;
        let ours = self.consumer.wait_until(deadline);
        let theirs = ours && other.consumer.wait_until(deadline);
        if theirs {
            WaitOutcome::Signalled
        } else {
            trace!("compare wait timed out");
            WaitOutcome::TimedOut
        }
    }

    // ── Worker thread lifecycle ──────────────────────────────────────────────

    /// Start the worker thread unless it is already running.
    pub(crate) fn start<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut thread = self.thread.lock();
        if let Some(handle) = thread.as_ref() {
            if !handle.is_finished() {
                if self.is_active() {
                    return Ok(());
                }
                return Err(ExtractError::WorkerUnavailable(
                    "previous worker is still shutting down".into(),
                ));
            }
        }
        if let Some(handle) = thread.take() {
            let _ = handle.join();
        }

        // a hard abort leaves the register cancelled
        self.status.transition(RequestStatus::Cancelled, RequestStatus::Closed);
        self.exited.reset();
        self.active.store(true, Ordering::Release);

        match std::thread::Builder::new()
            .name("pdfsearch-worker".into())
            .spawn(body)
        {
            Ok(handle) => {
                debug!("worker thread started");
                *thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::Release);
                Err(ExtractError::WorkerUnavailable(e.to_string()))
            }
        }
    }

    /// Called by the worker as its very last action.
    pub(crate) fn mark_exited(&self) {
        self.set_document_open(false);
        self.exited.set();
    }

    /// Cancel the running extraction and let the worker close its document.
    /// The worker thread stays alive.
    pub(crate) fn stop(&self) {
        let prev = self
            .status
            .transition(RequestStatus::Active, RequestStatus::Cancelled);
        if matches!(prev, RequestStatus::Active | RequestStatus::Complete) {
            trace!(?prev, "stop requested");
            self.notify_producer_wait_for_consumer(self.timeouts.consumer);
        }
    }

    /// Finish the running extraction without closing the document.
    pub(crate) fn done(&self) {
        let prev = self
            .status
            .transition(RequestStatus::Active, RequestStatus::Complete);
        if prev == RequestStatus::Active {
            self.notify_producer_wait_for_consumer(self.timeouts.consumer);
        }
    }

    /// Cancel everything and terminate the worker thread.
    pub(crate) fn abort(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.status.force(RequestStatus::Cancelled);
            self.request.lock().path = None;

            self.producer.set();
            let exited = self.exited.wait(Some(self.timeouts.producer));
            self.consumer.reset();

            if exited {
                if let Some(handle) = self.thread.lock().take() {
                    let _ = handle.join();
                }
                debug!("worker thread joined");
            } else {
                warn!("worker did not exit within {:?}", self.timeouts.producer);
            }
        }
    }

    // ── Request data ─────────────────────────────────────────────────────────

    /// Fill in a new request.
    ///
    /// The buffer is kept for streaming continuations, which may still hold
    /// unread text; every other request starts with an empty buffer.
    pub(crate) fn init_request(
        &self,
        path: &Path,
        field: Field,
        unit: i32,
        flags: u32,
        timeout: Duration,
    ) -> Armed {
        let mut request = self.request.lock();
        request.path = Some(path.to_path_buf());
        request.field = field;
        request.unit = unit;
        request.flags = flags;
        request.timeout = timeout;

        if !(field.is_streaming() && unit > 0) {
            request.buffer.reset();
        }
        if request.buffer.is_empty() {
            request.tag = ResultTag::Empty;
            request.scalar = Scalar::None;
            Armed::NeedsWorker
        } else {
            request.tag = ResultTag::FullText;
            Armed::Buffered
        }
    }

    pub(crate) fn has_pending_text(&self) -> bool {
        !self.request.lock().buffer.is_empty()
    }

    pub(crate) fn set_value(&self, value: Scalar, tag: ResultTag) {
        let mut request = self.request.lock();
        request.scalar = value;
        request.tag = tag;
    }

    /// Store a short string result.
    pub(crate) fn set_text(&self, text: &str) {
        let units = encode_filtered(text);
        let mut request = self.request.lock();
        request.buffer.reset();
        request.buffer.write(&units);
        request.tag = ResultTag::String;
    }

    pub(crate) fn set_error(&self) {
        let mut request = self.request.lock();
        request.buffer.reset();
        request.scalar = Scalar::None;
        request.tag = ResultTag::Error;
    }

    /// Text sink of the worker's extraction routines.
    ///
    /// Converts `text` into the request buffer. One-shot fields complete the
    /// request once the buffer is full (or, for the first row, at the first
    /// line break). Streaming fields hand the full buffer to the consumer and
    /// block until the consumer asks for more; returning `Break` stops the
    /// extraction.
    pub(crate) fn output(&self, text: &str) -> ControlFlow<()> {
        if self.status() != RequestStatus::Active {
            return ControlFlow::Break(());
        }
        let units = encode_filtered(text);
        let mut pending: &[u16] = &units;

        while !pending.is_empty() {
            let mut request = self.request.lock();
            while request.buffer.is_full() {
                let timeout = request.timeout;
                let woken = MutexGuard::unlocked(&mut request, || self.producer.wait(Some(timeout)));
                if !woken {
                    debug!("consumer did not ask for more text, cancelling");
                    self.status
                        .transition(RequestStatus::Active, RequestStatus::Cancelled);
                    return ControlFlow::Break(());
                }
                if self.status() != RequestStatus::Active {
                    return ControlFlow::Break(());
                }
                if request.buffer.is_full() {
                    // woken without anything taken, hand the same text back
                    self.consumer.set();
                }
            }

            let field = request.field;
            if field == Field::FirstRow && request.buffer.is_empty() {
                let skip = pending.iter().take_while(|&&u| is_eol(u)).count();
                pending = &pending[skip..];
                if pending.is_empty() {
                    break;
                }
            }

            let start = request.buffer.len();
            let written = request.buffer.write(pending);
            pending = &pending[written..];

            let mut finished = false;
            match field.kind() {
                FieldKind::OneShotText => {
                    request.tag = ResultTag::String;
                    if field == Field::FirstRow {
                        let eol = request.buffer.as_slice()[start..].iter().position(|&u| is_eol(u));
                        if let Some(pos) = eol {
                            request.buffer.truncate(start + pos);
                            finished = true;
                        }
                    }
                    finished |= request.buffer.is_full();
                }
                _ => request.tag = ResultTag::FullText,
            }
            let full = request.buffer.is_full();
            drop(request);

            if finished {
                self.status
                    .transition(RequestStatus::Active, RequestStatus::Complete);
                return ControlFlow::Break(());
            }
            if full {
                if self.status() != RequestStatus::Active {
                    return ControlFlow::Break(());
                }
                trace!("buffer full, consumer notified");
                self.consumer.set();
            }
        }
        ControlFlow::Continue(())
    }
}

fn is_eol(unit: u16) -> bool {
    unit == u16::from(b'\r') || unit == u16::from(b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> RequestChannel {
        RequestChannel::new(Timeouts::default(), capacity, false)
    }

    fn armed(capacity: usize, field: Field, timeout: Duration) -> RequestChannel {
        let channel = channel(capacity);
        channel.init_request(Path::new("doc.pdf"), field, 0, 0, timeout);
        channel.transition(RequestStatus::Closed, RequestStatus::Active);
        channel
    }

    fn text(channel: &RequestChannel) -> String {
        String::from_utf16_lossy(channel.lock().buffer.as_slice())
    }

    #[test]
    fn first_row_ends_at_line_break() {
        let channel = armed(64, Field::FirstRow, Duration::ZERO);
        assert!(channel.output("\r\n\nabc\ndef").is_break());
        assert_eq!(text(&channel), "abc");
        assert_eq!(channel.status(), RequestStatus::Complete);
        assert_eq!(channel.lock().tag, ResultTag::String);
        // nothing more is accepted once complete
        assert!(channel.output("xyz").is_break());
    }

    #[test]
    fn document_start_completes_when_full() {
        let channel = armed(4, Field::DocStart, Duration::ZERO);
        assert!(channel.output("ab").is_continue());
        assert!(channel.output("cdef").is_break());
        assert_eq!(text(&channel), "abcd");
        assert_eq!(channel.status(), RequestStatus::Complete);
    }

    #[test]
    fn unread_stream_is_cancelled_after_timeout() {
        let channel = armed(4, Field::Text, Duration::from_millis(20));
        assert!(channel.output("abcdefgh").is_break());
        assert_eq!(text(&channel), "abcd");
        assert_eq!(channel.lock().tag, ResultTag::FullText);
        assert_eq!(channel.status(), RequestStatus::Cancelled);
    }

    #[test]
    fn continuation_keeps_unread_text() {
        let channel = armed(8, Field::Text, Duration::ZERO);
        channel.lock().buffer.write(&[u16::from(b'x')]);
        let armed = channel.init_request(Path::new("doc.pdf"), Field::Text, 1, 0, Duration::ZERO);
        assert_eq!(armed, Armed::Buffered);
        assert!(channel.has_pending_text());

        let armed = channel.init_request(Path::new("doc.pdf"), Field::Title, 0, 0, Duration::ZERO);
        assert_eq!(armed, Armed::NeedsWorker);
        assert!(!channel.has_pending_text());
    }

    #[test]
    fn waiting_without_worker_fails() {
        let channel = channel(8);
        assert_eq!(
            channel.notify_producer_wait_for_consumer(Duration::from_millis(10)),
            WaitOutcome::Failed
        );
    }
}
