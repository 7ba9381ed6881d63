use crate::channel::{Request, WaitOutcome};
use crate::extractor::Admission;
use crate::status::RequestStatus;
use crate::{CompareVerdict, Field, ResultTag, Scalar};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Characters ignored by the text fallback comparison.
const DELIMITERS: &[char] = &[
    ' ', '\r', '\n', '\u{8}', '\u{c}', '\t', '\u{b}', '\u{a0}', '\u{202f}', '\u{2007}', '\u{2009}', '\u{2060}',
];

/// Result of one comparison round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// Both sides agreed on `units` more UTF-16 units; `as_text` is set
    /// when the agreement needed normalisation.
    More { units: usize, as_text: bool },
    Verdict(CompareVerdict),
}

// ── Comparison ────────────────────────────────────────────────────────────────

impl super::PdfExtractor {
    /// Compare one field of two documents.
    ///
    /// Both documents are extracted concurrently, this pipeline reading
    /// `path1` and a lazily created peer pipeline reading `path2`. Text
    /// fields are compared chunk by chunk, first binary and, where that
    /// fails, ignoring whitespace and case; a text-only match yields
    /// [`CompareVerdict::EqualAsText`].
    ///
    /// `progress` is called about every producer timeout with the number of
    /// bytes compared since the previous call; returning `true` aborts the
    /// comparison.
    pub fn compare<F>(&mut self, mut progress: F, path1: &Path, path2: &Path, field: Field) -> CompareVerdict
    where
        F: FnMut(usize) -> bool,
    {
        let timeout = self.timeouts().consumer;
        match self.init_data(path1, field, 0, 0, timeout) {
            Admission::Armed => {}
            Admission::Busy => return CompareVerdict::Aborted,
            _ => return CompareVerdict::Unsupported,
        }

        let mut peer = self.peer.take().unwrap_or_else(|| self.new_peer());
        peer.set_no_cache(self.channel.no_cache());

        let verdict = match peer.init_data(path2, field, 0, 0, timeout) {
            Admission::Armed => self.run_comparison(&peer, field, &mut progress),
            Admission::Busy => CompareVerdict::Aborted,
            _ => CompareVerdict::Unsupported,
        };

        self.channel.done();
        peer.channel.done();
        self.peer = Some(peer);

        debug!(?field, ?verdict, "comparison finished");
        verdict
    }

    fn run_comparison<F>(&self, peer: &Self, field: Field, progress: &mut F) -> CompareVerdict
    where
        F: FnMut(usize) -> bool,
    {
        if let Err(e) = self.start_worker().and_then(|_| peer.start_worker()) {
            warn!(error = %e, "cannot start comparison workers");
            return CompareVerdict::Error;
        }
        self.arm();
        peer.arm();

        let ours = &self.channel;
        let theirs = &peer.channel;
        let timeouts = self.timeouts();
        let mut as_text = false;
        let mut compared = 0usize;
        let mut last_report = Instant::now();

        loop {
            match ours.compare_wait_for_consumers(theirs, timeouts.consumer) {
                WaitOutcome::Signalled => {}
                WaitOutcome::TimedOut => return CompareVerdict::Aborted,
                WaitOutcome::Failed => return CompareVerdict::Error,
            }

            let round = {
                // fixed lock order: this pipeline first, then the peer
                let mut a = ours.lock();
                let mut b = theirs.lock();
                let a_done = ours.status() != RequestStatus::Active;
                let b_done = theirs.status() != RequestStatus::Active;
                compare_round(&mut a, &mut b, a_done, b_done)
            };
            trace!(?field, ?round, "compare round");

            match round {
                Round::Verdict(verdict) => {
                    return match verdict {
                        CompareVerdict::Equal if as_text => CompareVerdict::EqualAsText,
                        other => other,
                    };
                }
                Round::More { units, as_text: text } => {
                    as_text |= text;
                    compared += units;
                }
            }

            if last_report.elapsed() > timeouts.producer {
                if progress(compared * 2) {
                    debug!("comparison aborted by caller");
                    return CompareVerdict::Aborted;
                }
                compared = 0;
                last_report = Instant::now();
            }
        }
    }
}

/// Compare whatever both requests hold right now and consume the agreed
/// prefix. `a_done`/`b_done` tell whether a side will produce more.
fn compare_round(a: &mut Request, b: &mut Request, a_done: bool, b_done: bool) -> Round {
    if a.tag == ResultTag::Error || b.tag == ResultTag::Error {
        return Round::Verdict(CompareVerdict::Error);
    }
    if is_scalar(a.tag) || is_scalar(b.tag) {
        let equal = a.tag == b.tag && scalar_eq(a.scalar, b.scalar);
        return Round::Verdict(if equal {
            CompareVerdict::Equal
        } else {
            CompareVerdict::NotEqual
        });
    }

    let mut units = 0;
    let mut as_text = false;
    let (sa, sb) = (a.buffer.as_slice(), b.buffer.as_slice());
    let min = sa.len().min(sb.len());
    if min > 0 {
        if sa[..min] == sb[..min] {
            a.buffer.consume(min);
            b.buffer.consume(min);
            units = min;
        } else {
            let na = strip_delimiters(sa);
            let nb = strip_delimiters(sb);
            let n = na.len().min(nb.len());
            if !eq_ignore_case(&na[..n], &nb[..n]) {
                return Round::Verdict(CompareVerdict::NotEqual);
            }
            a.buffer.replace(&na[n..]);
            b.buffer.replace(&nb[n..]);
            units = n;
            as_text = true;
        }
    }

    let (a_left, b_left) = (!a.buffer.is_empty(), !b.buffer.is_empty());
    if (a_left && b_done && !b_left) || (b_left && a_done && !a_left) {
        return Round::Verdict(CompareVerdict::NotEqual);
    }
    if a_done && b_done && !a_left && !b_left {
        return Round::Verdict(CompareVerdict::Equal);
    }
    Round::More { units, as_text }
}

fn is_scalar(tag: ResultTag) -> bool {
    matches!(
        tag,
        ResultTag::Int32 | ResultTag::Boolean | ResultTag::Double | ResultTag::DateTime
    )
}

fn scalar_eq(a: Scalar, b: Scalar) -> bool {
    match (a, b) {
        (Scalar::Double(x), Scalar::Double(y)) => x.to_bits() == y.to_bits() || x == y,
        _ => a == b,
    }
}

/// UTF-16 text without the delimiter characters.
fn strip_delimiters(units: &[u16]) -> Vec<u16> {
    units
        .iter()
        .copied()
        .filter(|&u| !char::from_u32(u32::from(u)).is_some_and(|c| DELIMITERS.contains(&c)))
        .collect()
}

/// Case-insensitive comparison of two UTF-16 sequences of equal length.
fn eq_ignore_case(a: &[u16], b: &[u16]) -> bool {
    let lower = |units: &[u16]| -> String {
        char::decode_utf16(units.iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .flat_map(char::to_lowercase)
            .collect()
    };
    a == b || lower(a) == lower(b)
}
