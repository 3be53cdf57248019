//! Accumulated case list and offset pagination.

use std::collections::{HashMap, HashSet};

use crate::models::Case;

/// Default number of cases requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Merges `incoming` into `existing`, one entry per identifier.
///
/// The latest record for an identifier replaces the earlier one in place, so
/// list position follows first sighting. Records without an identifier are
/// dropped.
pub fn merge_by_id(existing: Vec<Case>, incoming: Vec<Case>) -> Vec<Case> {
    let mut merged: Vec<Case> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for case in existing.into_iter().chain(incoming) {
        if case.id.is_empty() {
            continue;
        }
        match index.get(&case.id) {
            Some(&pos) => merged[pos] = case,
            None => {
                index.insert(case.id.clone(), merged.len());
                merged.push(case);
            }
        }
    }

    merged
}

/// A page shorter than requested is the last one.
pub fn is_last_page(returned: usize, requested: u32) -> bool {
    returned < requested as usize
}

/// Offset window for one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: u32,
    pub offset: u64,
    pub limit: u32,
    /// First page replaces the accumulated list instead of extending it.
    pub initial: bool,
    /// List generation the request was planned against.
    pub generation: u64,
}

/// Case list accumulated over the session.
#[derive(Debug, Clone)]
pub struct FeedState {
    cases: Vec<Case>,
    page_size: u32,
    /// Last page successfully merged, `None` before the first load.
    page: Option<u32>,
    has_more: bool,
    error: Option<String>,
    dismissed: HashSet<String>,
    /// Bumped on every reset; pages planned before it are stale.
    generation: u64,
}

impl FeedState {
    pub fn new(page_size: u32) -> Self {
        Self {
            cases: Vec::new(),
            page_size: page_size.max(1),
            page: None,
            has_more: true,
            error: None,
            dismissed: HashSet::new(),
            generation: 0,
        }
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn dismissed(&self) -> &HashSet<String> {
        &self.dismissed
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn find(&self, id: &str) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Window for the first page.
    pub fn first_page(&self) -> PageRequest {
        PageRequest {
            page: 0,
            offset: 0,
            limit: self.page_size,
            initial: true,
            generation: self.generation,
        }
    }

    /// Window for the page after the last merged one, or `None` once the
    /// feed is exhausted.
    pub fn next_page(&self) -> Option<PageRequest> {
        match self.page {
            None => Some(self.first_page()),
            Some(_) if !self.has_more => None,
            Some(current) => {
                let page = current + 1;
                Some(PageRequest {
                    page,
                    offset: page as u64 * self.page_size as u64,
                    limit: self.page_size,
                    initial: false,
                    generation: self.generation,
                })
            }
        }
    }

    /// Whether a response to `request` may still touch this list.
    ///
    /// A page planned before the last reset is stale. So is a later page
    /// that does not directly follow the last merged one, since merging it
    /// would skip the pages in between.
    pub fn accepts(&self, request: &PageRequest) -> bool {
        if request.generation != self.generation {
            return false;
        }
        match (request.initial, self.page) {
            (true, _) => true,
            (false, None) => false,
            (false, Some(current)) => request.page <= current + 1,
        }
    }

    /// Merges a fetched page. Returns false, leaving the list untouched, when
    /// the request is stale.
    ///
    /// Repeats of an already merged page merge idempotently.
    pub fn apply_page(&mut self, request: PageRequest, rows: Vec<Case>) -> bool {
        if !self.accepts(&request) {
            return false;
        }
        let returned = rows.len();
        let existing = if request.initial {
            Vec::new()
        } else {
            std::mem::take(&mut self.cases)
        };
        self.cases = merge_by_id(existing, rows);
        let current = match self.page {
            Some(current) if !request.initial => current.max(request.page),
            _ => request.page,
        };
        // A repeated older page does not decide whether more exist
        if request.initial || self.page.map_or(true, |p| request.page >= p) {
            self.has_more = !is_last_page(returned, request.limit);
        }
        self.page = Some(current);
        self.error = None;
        true
    }

    /// Records a fetch failure. Cases and pagination stay as they were.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Hides a case for the rest of this session list.
    pub fn dismiss(&mut self, id: &str) {
        self.dismissed.insert(id.to_string());
    }

    /// Applies `f` to the held copy of a case. Returns false if not held.
    pub fn patch(&mut self, id: &str, f: impl FnOnce(&mut Case)) -> bool {
        match self.cases.iter_mut().find(|c| c.id == id) {
            Some(case) => {
                f(case);
                true
            }
            None => false,
        }
    }

    /// Drops everything loaded so far, including dismissals.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new(self.page_size);
        self.generation = generation;
    }
}
