//! Explicit view state of one volunteer session.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::feed::FeedState;
use crate::models::{Case, DetailTab, FeedItem, FeedResponse, Message};
use crate::pipeline::{compute_visible_list, FeedFilters};
use crate::realtime::{MessageBuffer, MessageSubscription};

/// The open detail panel. Owns the only live message subscription.
pub struct DetailView {
    pub case_id: String,
    pub tab: DetailTab,
    /// Copy taken when the panel opened; used if the feed no longer holds the case.
    pub snapshot: Case,
    pub messages: MessageBuffer,
    subscription: MessageSubscription,
}

impl DetailView {
    pub fn new(
        snapshot: Case,
        tab: DetailTab,
        messages: MessageBuffer,
        subscription: MessageSubscription,
    ) -> Self {
        Self {
            case_id: snapshot.id.clone(),
            tab,
            snapshot,
            messages,
            subscription,
        }
    }

    pub fn subscription(&self) -> &MessageSubscription {
        &self.subscription
    }
}

/// Everything the dashboard shows: feed, filters, open panel.
pub struct Session {
    pub feed: FeedState,
    pub filters: FeedFilters,
    detail: Option<DetailView>,
}

impl Session {
    pub fn new(page_size: u32, filters: FeedFilters) -> Self {
        Self {
            feed: FeedState::new(page_size),
            filters,
            detail: None,
        }
    }

    /// Renders the feed through the pipeline.
    pub fn feed_snapshot(&self, offline: bool) -> FeedResponse {
        let items = compute_visible_list(self.feed.cases(), &self.filters, self.feed.dismissed())
            .into_iter()
            .map(|v| FeedItem {
                risk_display: v.case.display_risk(),
                case: v.case.clone(),
                distance_km: v.distance_km,
            })
            .collect();

        FeedResponse {
            items,
            loaded: self.feed.cases().len(),
            page: self.feed.page(),
            has_more: self.feed.has_more(),
            error: self.feed.error().map(str::to_string),
            offline,
        }
    }

    pub fn detail(&self) -> Option<&DetailView> {
        self.detail.as_ref()
    }

    /// Installs a new detail view. The previous one, and its subscription,
    /// is released before this returns.
    pub fn replace_detail(&mut self, view: DetailView) {
        if let Some(previous) = self.detail.replace(view) {
            tracing::debug!("Replacing detail view of case {}", previous.case_id);
        }
    }

    /// Closes the panel and releases its subscription.
    pub fn close_detail(&mut self) -> bool {
        self.detail.take().is_some()
    }

    /// The freshest known copy of the open case.
    pub fn open_case(&self) -> Option<Case> {
        let view = self.detail.as_ref()?;
        Some(
            self.feed
                .find(&view.case_id)
                .cloned()
                .unwrap_or_else(|| view.snapshot.clone()),
        )
    }

    /// Keeps the open panel's copy in step with a local update.
    pub fn patch_open_snapshot(&mut self, updated: &Case) {
        if let Some(view) = self.detail.as_mut() {
            if view.case_id == updated.id {
                view.snapshot = updated.clone();
            }
        }
    }
}

/// Fresh shared buffer for a detail view.
pub fn new_buffer(initial: Vec<Message>) -> MessageBuffer {
    Arc::new(Mutex::new(initial))
}
