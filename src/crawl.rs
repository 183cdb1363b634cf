use crate::events::{redact_url_for_log, LogFn};
use crate::models::{DirectoryHandle, Entry, EntryKind, LeafResult};
use crate::names::{episode_number, trim_info};
use crate::pagination::{ListingClient, PageWalker};
use crate::{EngineError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Folders at this depth or deeper are not listed; the root is depth 0.
pub const MAX_DEPTH: u32 = 2;

/// Shared stop flag for an in-flight crawl. Clones observe the same flag; a child
/// token also stops when its parent does, but cancelling it leaves the parent alone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_canceled())
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(EngineError::Canceled);
        }
        Ok(())
    }
}

/// Inclusive episode window, counted over every accepted file in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpisodeRange {
    pub start: u32,
    pub stop: u32,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_depth: u32,
    /// Lower-cased folder names, matched as whole names.
    pub blacklist: Vec<String>,
    pub accepted_media_prefix: String,
    pub trim_names: bool,
    /// Only honoured when `max_depth == 1`.
    pub range: Option<EpisodeRange>,
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            blacklist: Vec::new(),
            accepted_media_prefix: "video/".to_string(),
            trim_names: true,
            range: None,
            parallel: false,
            max_workers: 4,
        }
    }
}

impl CrawlOptions {
    pub fn parse_blacklist(raw: &str) -> Vec<String> {
        raw.split('/')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_blacklisted(&self, folder_name: &str) -> bool {
        let name = folder_name.trim().to_lowercase();
        self.blacklist.iter().any(|b| *b == name)
    }

    fn effective_range(&self) -> Option<EpisodeRange> {
        if self.max_depth == 1 {
            self.range
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBranch {
    pub address: String,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlOutcome {
    /// Newest-first: the reverse of discovery order.
    pub leaves: Vec<LeafResult>,
    pub thumbnail_url: Option<String>,
    pub skipped: Vec<SkippedBranch>,
}

/// Mutable state owned by exactly one traversal.
#[derive(Default)]
struct Accumulator {
    discovered: Vec<LeafResult>,
    next_ordinal: u32,
    thumbnail_url: Option<String>,
    skipped: Vec<SkippedBranch>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            next_ordinal: 1,
            ..Self::default()
        }
    }

    fn into_outcome(self) -> CrawlOutcome {
        let mut leaves = self.discovered;
        leaves.reverse();
        CrawlOutcome {
            leaves,
            thumbnail_url: self.thumbnail_url,
            skipped: self.skipped,
        }
    }
}

struct Frame<'c, 'a> {
    handle: DirectoryHandle,
    path: String,
    depth: u32,
    walker: PageWalker<'c, 'a>,
    pending: VecDeque<Entry>,
}

enum Visit<'c, 'a> {
    Continue,
    Descend(Frame<'c, 'a>),
    Stop,
}

/// Root-level piece of a parallel crawl, kept in discovery order.
enum Segment {
    Entry(Entry),
    Subtree { handle: DirectoryHandle, path: String },
}

pub struct Crawler<'c, 'a> {
    client: &'c ListingClient<'a>,
    options: &'c CrawlOptions,
    cancel: CancelToken,
    log: LogFn<'c>,
}

impl<'c, 'a> Crawler<'c, 'a> {
    pub fn new(client: &'c ListingClient<'a>, options: &'c CrawlOptions, cancel: CancelToken, log: LogFn<'c>) -> Self {
        Self {
            client,
            options,
            cancel,
            log,
        }
    }

    /// Crawl `handle` and everything below it within the depth bound.
    pub fn descend(&self, handle: &DirectoryHandle, path: &str, depth: u32) -> Result<CrawlOutcome> {
        (self.log)(
            "info",
            "crawl_begin",
            serde_json::json!({
                "root": redact_url_for_log(&handle.address),
                "max_depth": self.options.max_depth,
                "parallel": self.options.parallel,
            }),
        );
        let outcome = if self.options.parallel && self.options.max_depth > depth + 1 {
            self.descend_parallel(handle, path, depth)?
        } else {
            let mut acc = Accumulator::new();
            self.run(handle.clone(), path.to_string(), depth, Vec::new(), &mut acc, false)?;
            acc.into_outcome()
        };
        (self.log)(
            "info",
            "crawl_done",
            serde_json::json!({
                "leaves": outcome.leaves.len(),
                "skipped": outcome.skipped.len(),
                "thumbnail": outcome.thumbnail_url.is_some(),
            }),
        );
        Ok(outcome)
    }

    fn frame(&self, handle: DirectoryHandle, path: String, depth: u32) -> Frame<'c, 'a> {
        let walker = self.client.walk(&handle, None);
        Frame {
            handle,
            path,
            depth,
            walker,
            pending: VecDeque::new(),
        }
    }

    /// Depth-first walk over an explicit frame stack. Entries are handled in page order
    /// and a folder is fully drained before its next sibling, matching a recursive walk.
    ///
    /// `lineage` holds the ids of the folders above `root`; it mirrors the stack so a
    /// folder is refused only when it is one of its own ancestors.
    fn run(
        &self,
        root: DirectoryHandle,
        path: String,
        depth: u32,
        mut lineage: Vec<String>,
        acc: &mut Accumulator,
        absorb_root_errors: bool,
    ) -> Result<()> {
        if depth >= self.options.max_depth {
            return Ok(());
        }
        lineage.push(root.id.clone());
        let mut stack = vec![self.frame(root, path, depth)];

        while let Some(frame) = stack.last_mut() {
            self.cancel.check()?;

            if let Some(entry) = frame.pending.pop_front() {
                match self.visit(frame, entry, &lineage, acc) {
                    Visit::Continue => {}
                    Visit::Descend(child) => {
                        lineage.push(child.handle.id.clone());
                        stack.push(child);
                    }
                    Visit::Stop => return Ok(()),
                }
                continue;
            }

            match frame.walker.next() {
                Some(Ok(page)) => {
                    (self.log)(
                        "debug",
                        "page_fetched",
                        serde_json::json!({
                            "path": frame.path,
                            "page_index": frame.walker.page_index().saturating_sub(1),
                            "entries": page.entries.len(),
                            "has_next": page.next_cursor.is_some(),
                        }),
                    );
                    frame.pending.extend(page.entries);
                }
                Some(Err(err)) => {
                    let is_root = stack.len() == 1 && !absorb_root_errors;
                    if is_root || err.is_session_fatal() {
                        return Err(err);
                    }
                    let failed = stack.pop();
                    lineage.pop();
                    if let Some(failed) = failed {
                        (self.log)(
                            "warn",
                            "branch_skipped",
                            serde_json::json!({
                                "address": redact_url_for_log(&failed.handle.address),
                                "path": failed.path,
                                "error": err.to_string(),
                            }),
                        );
                        acc.skipped.push(SkippedBranch {
                            address: failed.handle.address,
                            path: failed.path,
                            error: err.to_string(),
                        });
                    }
                }
                None => {
                    stack.pop();
                    lineage.pop();
                }
            }
        }
        Ok(())
    }

    fn visit(&self, frame: &Frame<'c, 'a>, entry: Entry, lineage: &[String], acc: &mut Accumulator) -> Visit<'c, 'a> {
        match entry.kind {
            EntryKind::Folder => match self.child_of(&frame.handle, &frame.path, frame.depth, &entry, lineage) {
                Some((handle, path)) => Visit::Descend(self.frame(handle, path, frame.depth + 1)),
                None => Visit::Continue,
            },
            EntryKind::File => self.visit_file(&frame.handle, &frame.path, entry, acc),
        }
    }

    /// The handle and path to descend into, or `None` when the folder is blacklisted,
    /// below the depth bound, or one of its own ancestors.
    fn child_of(
        &self,
        parent: &DirectoryHandle,
        path: &str,
        depth: u32,
        entry: &Entry,
        lineage: &[String],
    ) -> Option<(DirectoryHandle, String)> {
        if self.options.is_blacklisted(&entry.name) {
            (self.log)(
                "info",
                "folder_blacklisted",
                serde_json::json!({ "path": path, "name": entry.name }),
            );
            return None;
        }
        if depth + 1 >= self.options.max_depth {
            return None;
        }
        let child = parent.child(entry);
        if lineage.contains(&child.id) {
            (self.log)(
                "warn",
                "folder_revisited",
                serde_json::json!({ "path": path, "name": entry.name }),
            );
            return None;
        }
        Some((child, format!("{path}/{}", entry.name)))
    }

    fn visit_file(&self, handle: &DirectoryHandle, path: &str, entry: Entry, acc: &mut Accumulator) -> Visit<'c, 'a> {
        if entry.media_type.starts_with("image/") && entry.name.to_lowercase().starts_with("cover") {
            if acc.thumbnail_url.is_none() {
                acc.thumbnail_url = Some(handle.file_url(&entry.name));
            }
            return Visit::Continue;
        }
        if !entry.media_type.starts_with(&self.options.accepted_media_prefix) {
            return Visit::Continue;
        }

        let ordinal = acc.next_ordinal;
        if let Some(range) = self.options.effective_range() {
            if ordinal < range.start {
                acc.next_ordinal += 1;
                return Visit::Continue;
            }
            if ordinal > range.stop {
                return Visit::Stop;
            }
        }

        let display_name = if self.options.trim_names {
            trim_info(&entry.name)
        } else {
            entry.name.clone()
        };
        let episode = episode_number(&entry.name).unwrap_or(ordinal as f32);
        acc.discovered.push(LeafResult {
            display_name,
            raw_reference: handle.file_url(&entry.name),
            path: path.to_string(),
            size_bytes: entry.size_bytes,
            ordinal,
            episode_number: episode,
        });
        acc.next_ordinal += 1;
        Visit::Continue
    }

    /// Walk the root sequentially, then crawl each root-level subfolder on a worker
    /// thread. Results are stitched back together in discovery order and ordinals are
    /// renumbered, so the output matches a sequential crawl.
    fn descend_parallel(&self, handle: &DirectoryHandle, path: &str, depth: u32) -> Result<CrawlOutcome> {
        let lineage = vec![handle.id.clone()];

        let mut segments: Vec<Segment> = Vec::new();
        let mut walker = self.client.walk(handle, None);
        loop {
            self.cancel.check()?;
            let Some(page) = walker.next() else {
                break;
            };
            for entry in page?.entries {
                match entry.kind {
                    EntryKind::Folder => {
                        if let Some((child, child_path)) =
                            self.child_of(handle, path, depth, &entry, &lineage)
                        {
                            segments.push(Segment::Subtree {
                                handle: child,
                                path: child_path,
                            });
                        }
                    }
                    EntryKind::File => segments.push(Segment::Entry(entry)),
                }
            }
        }

        let subtrees: Vec<(usize, &DirectoryHandle, &String)> = segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Segment::Subtree { handle, path } => Some((i, handle, path)),
                Segment::Entry(_) => None,
            })
            .collect();

        // A session-fatal error in one subtree stops the others without touching the
        // caller's token.
        let worker = Crawler {
            client: self.client,
            options: self.options,
            cancel: self.cancel.child(),
            log: self.log,
        };
        let results: Mutex<Vec<Option<Result<Accumulator>>>> =
            Mutex::new((0..segments.len()).map(|_| None).collect());
        let next_job = AtomicUsize::new(0);
        let workers = self.options.max_workers.clamp(1, subtrees.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let job = next_job.fetch_add(1, Ordering::SeqCst);
                    let Some((slot, sub_handle, sub_path)) = subtrees.get(job) else {
                        break;
                    };
                    let mut acc = Accumulator::new();
                    let result = worker
                        .run(
                            (*sub_handle).clone(),
                            (*sub_path).clone(),
                            depth + 1,
                            lineage.clone(),
                            &mut acc,
                            true,
                        )
                        .map(|_| acc);
                    if result.is_err() {
                        worker.cancel.cancel();
                    }
                    let mut guard = results.lock().unwrap_or_else(|e| e.into_inner());
                    guard[*slot] = Some(result);
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        let root_cause = results
            .iter()
            .position(|r| matches!(r, Some(Err(e)) if !matches!(e, EngineError::Canceled)));
        if let Some(pos) = root_cause {
            if let Some(Err(err)) = results[pos].take() {
                return Err(err);
            }
        }

        let mut merged = Accumulator::new();
        for (i, segment) in segments.into_iter().enumerate() {
            match segment {
                Segment::Entry(entry) => {
                    let _ = self.visit_file(handle, path, entry, &mut merged);
                }
                Segment::Subtree { .. } => {
                    let sub = match results[i].take() {
                        Some(result) => result?,
                        None => return Err(EngineError::Canceled),
                    };
                    for mut leaf in sub.discovered {
                        leaf.ordinal = merged.next_ordinal;
                        leaf.episode_number =
                            episode_number(&leaf.display_name).unwrap_or(leaf.ordinal as f32);
                        merged.next_ordinal += 1;
                        merged.discovered.push(leaf);
                    }
                    if merged.thumbnail_url.is_none() {
                        merged.thumbnail_url = sub.thumbnail_url;
                    }
                    merged.skipped.extend(sub.skipped);
                }
            }
        }
        Ok(merged.into_outcome())
    }
}

/// Display name for a root folder: its last non-empty path segment, percent-decoded.
pub fn root_display_name(address: &str) -> String {
    let trimmed = address.trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    url::form_urlencoded::parse(format!("n={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}
