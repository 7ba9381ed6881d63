use crate::buffer::{copy_terminated, REQUEST_BUFFER_UNITS};
use crate::channel::{Armed, RequestChannel, WaitOutcome};
use crate::document::PdfBackend;
use crate::status::RequestStatus;
use crate::worker::ExtractionWorker;
use crate::{Field, FieldResult, PluginOptions, Result, ResultTag, Scalar, Timeouts, DELAY_IF_SLOW};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Outcome of the admission check that precedes every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Nothing to do: a stop request, or a continuation with no data left.
    Rejected,
    /// An unrelated request is still running on the worker.
    Busy,
    /// The request is set up and the worker has to produce.
    Armed,
    /// A continuation that can be served from the buffer alone.
    Buffered,
}

// ── PdfExtractor ──────────────────────────────────────────────────────────────

/// Consumer side of one extraction pipeline.
///
/// Every extractor owns a worker thread (started on first use) that keeps
/// the most recently used document open between calls. Calls on one
/// extractor must not overlap; the host drives it from one thread at a time.
///
/// # Streaming fields
///
/// [`Field::Text`] and [`Field::Outlines`] are delivered in chunks. The
/// first call uses `unit == 0`, continuations use increasing positive
/// values, and the stream ends with [`FieldResult::FieldEmpty`]. A call with
/// `unit == -1` stops the stream early.
///
/// ```no_run
/// use std::sync::Arc;
/// use pdfsearch::{Field, FieldResult, LopdfBackend, PdfExtractor, PluginOptions};
///
/// let mut extractor = PdfExtractor::new(Arc::new(LopdfBackend), Arc::new(PluginOptions::default()));
/// let mut chunk = [0u16; 1024];
/// let mut unit = 0;
/// while let FieldResult::FullText(len) = extractor.extract("doc.pdf", Field::Text, unit, &mut chunk, 0) {
///     print!("{}", String::from_utf16_lossy(&chunk[..len]));
///     unit += 1;
/// }
/// ```
pub struct PdfExtractor {
    backend: Arc<dyn PdfBackend>,
    options: Arc<PluginOptions>,
    timeouts: Timeouts,
    pub(crate) channel: Arc<RequestChannel>,
    /// Second pipeline used as the other side of comparisons.
    pub(crate) peer: Option<Box<PdfExtractor>>,
}

impl PdfExtractor {
    // ── Constructors ──────────────────────────────────────────────────────────

    pub fn new(backend: Arc<dyn PdfBackend>, options: Arc<PluginOptions>) -> Self {
        Self::with_timeouts(backend, options, Timeouts::default())
    }

    pub fn with_timeouts(backend: Arc<dyn PdfBackend>, options: Arc<PluginOptions>, timeouts: Timeouts) -> Self {
        let channel = Arc::new(RequestChannel::new(timeouts, REQUEST_BUFFER_UNITS, options.no_cache));
        Self {
            backend,
            options,
            timeouts,
            channel,
            peer: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Current request status of this pipeline.
    pub fn status(&self) -> RequestStatus {
        self.channel.status()
    }

    /// Returns `true` while the worker holds a document open.
    pub fn is_document_open(&self) -> bool {
        self.channel.is_document_open()
    }

    /// Close the document after every request instead of caching it.
    pub fn set_no_cache(&self, no_cache: bool) {
        self.channel.set_no_cache(no_cache);
        if let Some(peer) = &self.peer {
            peer.set_no_cache(no_cache);
        }
    }

    // ── Extraction ────────────────────────────────────────────────────────────

    /// Extract one field of the document at `path`.
    ///
    /// Text results are written to `dest` NUL-terminated; the result carries
    /// the number of UTF-16 units before the terminator. `unit` selects the
    /// measurement unit of page sizes and the chunk sequence of streaming
    /// fields. With [`DELAY_IF_SLOW`] in `flags` nothing is extracted and
    /// [`FieldResult::Delayed`] is returned.
    pub fn extract<P: AsRef<Path>>(
        &mut self,
        path: P,
        field: Field,
        unit: i32,
        dest: &mut [u16],
        flags: u32,
    ) -> FieldResult {
        if flags & DELAY_IF_SLOW != 0 {
            return FieldResult::Delayed;
        }
        let path = path.as_ref();
        let admission = self.init_data(path, field, unit, flags, self.timeouts.producer);
        trace!(path = %path.display(), ?field, unit, ?admission, "request admitted");

        let result = match admission {
            Admission::Rejected if unit == -1 => FieldResult::Cancelled,
            Admission::Rejected => FieldResult::FieldEmpty,
            Admission::Busy => FieldResult::Timeout,
            _ if field.is_streaming() => self.extract_streaming(unit, admission, dest),
            _ => self.extract_value(dest),
        };
        trace!(?field, unit, ?result, "request answered");
        result
    }

    /// Admission check and request setup.
    ///
    /// A fresh streaming request first stops whatever runs on the worker.
    /// Continuations of a finished stream are only admitted while the
    /// buffer still holds text; any other request is refused while the
    /// worker is busy with a different one.
    pub(crate) fn init_data(
        &mut self,
        path: &Path,
        field: Field,
        unit: i32,
        flags: u32,
        timeout: Duration,
    ) -> Admission {
        if !self.channel.is_active() {
            // no worker left to finish a cancellation
            self.channel
                .transition(RequestStatus::Cancelled, RequestStatus::Closed);
        }

        let streaming = field.is_streaming();
        if streaming && unit <= 0 {
            self.channel.stop();
            if unit == -1 {
                return Admission::Rejected;
            }
        } else if self.channel.status() == RequestStatus::Cancelled {
            // cancelled but the document is not closed yet
            self.channel.wait_for_consumer(self.timeouts.consumer);
        }

        let continuation = streaming && unit > 0;
        match self.channel.status() {
            RequestStatus::Cancelled => Admission::Rejected,
            RequestStatus::Active if !continuation => Admission::Busy,
            RequestStatus::Closed | RequestStatus::Complete if continuation => {
                if self.channel.has_pending_text() {
                    Admission::Buffered
                } else {
                    Admission::Rejected
                }
            }
            _ => match self.channel.init_request(path, field, unit, flags, timeout) {
                Armed::NeedsWorker => Admission::Armed,
                Armed::Buffered => Admission::Buffered,
            },
        }
    }

    /// A second pipeline sharing this one's backend, options and timeouts.
    pub(crate) fn new_peer(&self) -> Box<PdfExtractor> {
        Box::new(Self::with_timeouts(
            Arc::clone(&self.backend),
            Arc::clone(&self.options),
            self.timeouts,
        ))
    }

    /// Move the status to active for a new request.
    pub(crate) fn arm(&self) {
        if self
            .channel
            .transition(RequestStatus::Complete, RequestStatus::Active)
            != RequestStatus::Complete
        {
            self.channel
                .transition(RequestStatus::Closed, RequestStatus::Active);
        }
    }

    /// Start the worker thread if it is not running yet.
    pub(crate) fn start_worker(&self) -> Result<()> {
        let worker = ExtractionWorker::new(
            Arc::clone(&self.channel),
            Arc::clone(&self.backend),
            Arc::clone(&self.options),
        );
        self.channel.start(move || worker.run())
    }

    fn extract_value(&mut self, dest: &mut [u16]) -> FieldResult {
        self.arm();
        if let Err(e) = self.start_worker() {
            warn!(error = %e, "cannot start extraction worker");
            return FieldResult::FileError;
        }
        match self.channel.notify_producer_wait_for_consumer(self.timeouts.consumer) {
            WaitOutcome::Signalled => {}
            WaitOutcome::TimedOut => {
                debug!("worker did not answer within {:?}", self.timeouts.consumer);
                return FieldResult::Timeout;
            }
            WaitOutcome::Failed => {
                self.channel
                    .transition(RequestStatus::Active, RequestStatus::Cancelled);
                return FieldResult::FileError;
            }
        }

        let mut request = self.channel.lock();
        match (request.tag, request.scalar) {
            (ResultTag::Error, _) => FieldResult::FileError,
            (ResultTag::Int32, Scalar::Int(v)) => FieldResult::Int32(v),
            (ResultTag::Boolean, Scalar::Bool(v)) => FieldResult::Boolean(v),
            (ResultTag::Double, Scalar::Double(v)) => FieldResult::Double(v),
            (ResultTag::DateTime, Scalar::DateTime(v)) => FieldResult::DateTime(v),
            (ResultTag::String | ResultTag::FullText, _) if !request.buffer.is_empty() => {
                let n = copy_terminated(request.buffer.as_slice(), dest);
                request.buffer.reset();
                FieldResult::String(n)
            }
            _ => FieldResult::FieldEmpty,
        }
    }

    fn extract_streaming(&mut self, unit: i32, admission: Admission, dest: &mut [u16]) -> FieldResult {
        if dest.is_empty() {
            return FieldResult::NoSuchField;
        }
        if admission == Admission::Armed {
            if unit == 0 {
                self.arm();
                if let Err(e) = self.start_worker() {
                    warn!(error = %e, "cannot start extraction worker");
                    return FieldResult::FileError;
                }
            }
            // a timeout here is normal, the caller takes what is there
            if self.channel.notify_producer_wait_for_consumer(self.timeouts.stream_poll) == WaitOutcome::Failed {
                return FieldResult::FileError;
            }
        }

        let mut request = self.channel.lock();
        if request.tag == ResultTag::Error {
            return FieldResult::FileError;
        }
        if request.buffer.is_empty() {
            if self.channel.status() != RequestStatus::Active {
                return FieldResult::FieldEmpty;
            }
            // keep the host asking while the worker is still producing
            return FieldResult::FullText(copy_terminated(&[u16::from(b' ')], dest));
        }
        FieldResult::FullText(request.buffer.drain_into(dest))
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Soft-cancel the running extraction. The worker closes its document but
    /// keeps running.
    pub fn stop(&self) {
        self.channel.stop();
        if let Some(peer) = &self.peer {
            peer.stop();
        }
    }

    /// Finish the running extraction and keep the document open.
    pub fn done(&self) {
        self.channel.done();
        if let Some(peer) = &self.peer {
            peer.done();
        }
    }

    /// Stop everything and terminate the worker threads.
    pub fn abort(&self) {
        self.channel.abort();
        if let Some(peer) = &self.peer {
            peer.abort();
        }
    }
}

impl Drop for PdfExtractor {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for PdfExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfExtractor")
            .field("status", &self.status())
            .field("document_open", &self.is_document_open())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
