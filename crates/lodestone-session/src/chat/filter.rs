//! Content filtering off the tick loop.
//!
//! A [`FilterPool`] runs a [`TextFilter`] on worker threads. Each player
//! gets a [`FilterSession`] with a private result queue and cancellation
//! flag; results are collected by the tick loop and released in
//! submission order by the player's chat chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use lodestone_net::GameProfile;
use lodestone_net::packets::types::FilterMask;

/// Raw text plus the redaction the filter decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredText {
    /// Text as sent.
    pub raw: String,
    /// Redaction mask.
    pub mask: FilterMask,
}

impl FilteredText {
    /// Text with no redaction.
    pub fn passthrough(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            mask: FilterMask::PassThrough,
        }
    }

    /// Text redacted entirely.
    pub fn fully_filtered(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            mask: FilterMask::FullyFiltered,
        }
    }

    /// Whether any part is redacted.
    pub fn is_filtered(&self) -> bool {
        self.mask != FilterMask::PassThrough
    }

    /// The redacted text, `None` when nothing remains.
    pub fn filtered(&self) -> Option<String> {
        self.mask.apply(&self.raw)
    }
}

/// Filter backend failure. Always degrades to full redaction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    /// The backend could not be reached.
    #[error("filter unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the request.
    #[error("filter rejected request: {0}")]
    Rejected(String),
}

/// A content filter backend.
pub trait TextFilter: Send + Sync {
    /// Decide the redaction for `text` sent by `sender`.
    fn filter(&self, sender: &GameProfile, text: &str) -> Result<FilteredText, FilterError>;
}

/// Filter that never redacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFilter;

impl TextFilter for PassthroughFilter {
    fn filter(&self, _sender: &GameProfile, text: &str) -> Result<FilteredText, FilterError> {
        Ok(FilteredText::passthrough(text))
    }
}

/// Filter that masks every case-insensitive occurrence of listed words.
#[derive(Debug, Clone, Default)]
pub struct BlockListFilter {
    words: Vec<String>,
}

impl BlockListFilter {
    /// Block the given words.
    pub fn new(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            words: words
                .into_iter()
                .map(|w| w.into().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

impl TextFilter for BlockListFilter {
    fn filter(&self, _sender: &GameProfile, text: &str) -> Result<FilteredText, FilterError> {
        let lowered: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
        if lowered.len() != text.chars().count() {
            // Case folding changed the length, char indices no longer line up.
            return Ok(FilteredText::fully_filtered(text));
        }
        let mut masked = Vec::new();
        for word in &self.words {
            let needle: Vec<char> = word.chars().collect();
            for start in 0..lowered.len().saturating_sub(needle.len() - 1) {
                if lowered[start..start + needle.len()] == needle[..] {
                    masked.extend(start..start + needle.len());
                }
            }
        }
        Ok(FilteredText {
            raw: text.to_string(),
            mask: FilterMask::from_indices(masked),
        })
    }
}

/// A finished filter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Ticket returned by [`FilterSession::submit`].
    pub ticket: u64,
    /// Filter result.
    pub text: FilteredText,
}

struct FilterJob {
    sender: GameProfile,
    ticket: u64,
    text: String,
    cancelled: Arc<AtomicBool>,
    reply: Sender<FilterOutcome>,
}

/// Worker pool running a [`TextFilter`].
pub struct FilterPool {
    jobs: Sender<FilterJob>,
    workers: usize,
}

impl FilterPool {
    /// Start `workers` threads (0 picks a count from the CPU).
    pub fn new(filter: Arc<dyn TextFilter>, workers: usize) -> Self {
        let workers = if workers == 0 {
            (num_cpus::get().max(2) - 2).max(1)
        } else {
            workers
        };
        let (jobs, receiver) = unbounded::<FilterJob>();

        for n in 0..workers {
            let receiver: Receiver<FilterJob> = receiver.clone();
            let filter = Arc::clone(&filter);
            std::thread::Builder::new()
                .name(format!("chat-filter-{n}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if job.cancelled.load(Ordering::Relaxed) {
                            continue;
                        }
                        let text = filter.filter(&job.sender, &job.text).unwrap_or_else(|e| {
                            tracing::warn!(player = %job.sender.name, "Text filter failed: {e}");
                            FilteredText::fully_filtered(job.text.as_str())
                        });
                        if !job.cancelled.load(Ordering::Relaxed) {
                            let _ = job.reply.send(FilterOutcome {
                                ticket: job.ticket,
                                text,
                            });
                        }
                    }
                })
                .expect("Failed to spawn chat filter worker thread");
        }

        tracing::debug!("Started {workers} chat filter workers");
        Self { jobs, workers }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Open a filter session for one player.
    pub fn session(&self, sender: GameProfile) -> FilterSession {
        let (reply, results) = unbounded();
        FilterSession {
            sender,
            jobs: self.jobs.clone(),
            reply,
            results,
            cancelled: Arc::new(AtomicBool::new(false)),
            next_ticket: 0,
        }
    }
}

/// One player's private filter queue.
pub struct FilterSession {
    sender: GameProfile,
    jobs: Sender<FilterJob>,
    reply: Sender<FilterOutcome>,
    results: Receiver<FilterOutcome>,
    cancelled: Arc<AtomicBool>,
    next_ticket: u64,
}

impl FilterSession {
    /// Queue `text` for filtering and return its ticket.
    pub fn submit(&mut self, text: impl Into<String>) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let text = text.into();
        let job = FilterJob {
            sender: self.sender.clone(),
            ticket,
            text,
            cancelled: Arc::clone(&self.cancelled),
            reply: self.reply.clone(),
        };
        if let Err(e) = self.jobs.send(job) {
            let job = e.into_inner();
            tracing::warn!(player = %self.sender.name, "Filter pool gone, redacting message");
            let _ = self.reply.send(FilterOutcome {
                ticket,
                text: FilteredText::fully_filtered(job.text),
            });
        }
        ticket
    }

    /// Take every result that arrived so far.
    pub fn poll(&self) -> Vec<FilterOutcome> {
        if self.is_cancelled() {
            return Vec::new();
        }
        self.results.try_iter().collect()
    }

    /// Stop delivering results for this session.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`FilterSession::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Drop for FilterSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
