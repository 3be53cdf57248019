//! User actions over the session.
//!
//! Network calls run with the session lock released, so filter changes are
//! never blocked behind a slow page. Results are merged back afterwards;
//! pages planned before a reload are dropped on arrival.

use chrono::Utc;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::backend::Backend;
use crate::config::Config;
use crate::errors::{AppError, ResultExt, OFFLINE_NOTICE};
use crate::feed::PageRequest;
use crate::geo::{distance_km, Coordinates};
use crate::models::{
    Case, CaseStatus, CaseUpdate, DetailResponse, DetailTab, FeedResponse, NewMessage, Sender,
    StatusResponse,
};
use crate::pipeline::{FeedFilters, FilterUpdate};
use crate::realtime::{DeliveryCursor, MessageSubscription};
use crate::session::{new_buffer, DetailView, Session};
use crate::timeline::build_timeline;

/// Content of the system message recorded for a simulated call.
pub const SIMULATED_CALL_MESSAGE: &str = "Ligação simulada ao responsável.";

#[derive(Clone)]
pub struct FeedService {
    backend: Backend,
    session: Arc<Mutex<Session>>,
    /// Cases with a mutation in flight, to reject double submissions.
    in_flight: Cache<String, i64>,
    poll_interval: Duration,
}

impl FeedService {
    pub fn new(backend: Backend, config: &Config, viewer: Option<Coordinates>) -> Self {
        let filters = FeedFilters {
            radius_km: config.default_radius_km,
            viewer,
            volunteer_name: config.volunteer_name.clone(),
            missing_location: config.missing_location,
            ..FeedFilters::default()
        };

        Self {
            backend,
            session: Arc::new(Mutex::new(Session::new(config.page_size, filters))),
            in_flight: Cache::builder()
                .time_to_live(Duration::from_secs(30))
                .max_capacity(1_000)
                .build(),
            poll_interval: config.realtime_poll_interval(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.backend.is_offline()
    }

    pub async fn status(&self) -> StatusResponse {
        let session = self.session.lock().await;
        StatusResponse {
            mode: if self.is_offline() { "offline" } else { "online" },
            notice: self.is_offline().then(|| OFFLINE_NOTICE.to_string()),
            error: session.feed.error().map(str::to_string),
        }
    }

    pub async fn feed(&self) -> FeedResponse {
        self.session.lock().await.feed_snapshot(self.is_offline())
    }

    pub async fn filters(&self) -> FeedFilters {
        self.session.lock().await.filters.clone()
    }

    /// Changes the volunteer's criteria. Fields absent from `update` keep
    /// their current value.
    pub async fn update_filters(&self, update: FilterUpdate) -> FeedResponse {
        let mut session = self.session.lock().await;
        let filters = update.apply_to(&session.filters);

        tracing::debug!("Filters updated: {:?}", filters);
        session.filters = filters;
        session.feed_snapshot(self.is_offline())
    }

    pub async fn load_first_page(&self) -> Result<FeedResponse, AppError> {
        let request = self.session.lock().await.feed.first_page();
        self.load_page(request).await
    }

    /// Loads the next page, or returns the current feed once exhausted.
    pub async fn load_next_page(&self) -> Result<FeedResponse, AppError> {
        let request = self.session.lock().await.feed.next_page();
        match request {
            Some(request) => self.load_page(request).await,
            None => Ok(self.feed().await),
        }
    }

    /// Drops the session list (and dismissals) and loads from the top.
    pub async fn reload(&self) -> Result<FeedResponse, AppError> {
        let request = {
            let mut session = self.session.lock().await;
            session.feed.reset();
            session.feed.first_page()
        };
        self.load_page(request).await
    }

    async fn load_page(&self, request: PageRequest) -> Result<FeedResponse, AppError> {
        let rows = self
            .backend
            .fetch_cases_page(request.offset, request.limit)
            .await;

        let mut session = self.session.lock().await;
        match rows {
            Ok(rows) => {
                for case in rows.iter().filter(|c| !c.assignment_is_consistent()) {
                    tracing::warn!(
                        "Case {} is {:?} with volunteer {:?}",
                        case.id,
                        case.status,
                        case.assigned_volunteer_name
                    );
                }
                let count = rows.len();
                if session.feed.apply_page(request, rows) {
                    tracing::info!("Loaded page {} with {} case(s)", request.page, count);
                } else {
                    tracing::debug!("Dropped stale page {} ({} case(s))", request.page, count);
                }
                Ok(session.feed_snapshot(self.is_offline()))
            }
            Err(e) => {
                tracing::warn!("Failed to load page {}: {}", request.page, e);
                // A stale request's failure says nothing about the current list
                if session.feed.accepts(&request) {
                    session.feed.record_error(e.user_message());
                }
                Err(e).context("Loading cases")
            }
        }
    }

    pub async fn dismiss_error(&self) {
        self.session.lock().await.feed.clear_error();
    }

    /// Hides a case locally. Never reaches the backend.
    pub async fn dismiss(&self, case_id: &str) -> FeedResponse {
        let mut session = self.session.lock().await;
        session.feed.dismiss(case_id);
        tracing::debug!("Case {} dismissed locally", case_id);
        session.feed_snapshot(self.is_offline())
    }

    fn loaded_case(session: &Session, case_id: &str) -> Result<Case, AppError> {
        session
            .feed
            .find(case_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Case {} is not loaded", case_id)))
    }

    /// Opens the detail panel, replacing any open one and its subscription.
    pub async fn open_case(&self, case_id: &str, tab: DetailTab) -> Result<DetailResponse, AppError> {
        let snapshot = Self::loaded_case(&*self.session.lock().await, case_id)?;

        let messages = self
            .backend
            .list_messages(case_id)
            .await
            .with_context(|| format!("Loading messages of case {}", case_id))?;

        let cursor = DeliveryCursor::after(&messages);
        let buffer = new_buffer(messages);
        let subscription = MessageSubscription::start(
            self.backend.clone(),
            case_id,
            buffer.clone(),
            cursor,
            self.poll_interval,
        );

        let mut session = self.session.lock().await;
        session.replace_detail(DetailView::new(snapshot, tab, buffer, subscription));
        tracing::info!("Opened case {} on {:?} tab", case_id, tab);
        Self::detail_response(&session).await
    }

    pub async fn detail(&self) -> Result<DetailResponse, AppError> {
        let session = self.session.lock().await;
        Self::detail_response(&session).await
    }

    async fn detail_response(session: &Session) -> Result<DetailResponse, AppError> {
        let (view, case) = match (session.detail(), session.open_case()) {
            (Some(view), Some(case)) => (view, case),
            _ => return Err(AppError::NotFound("No case is open".to_string())),
        };
        let messages = view.messages.lock().await.clone();

        Ok(DetailResponse {
            distance_km: distance_km(session.filters.viewer, case.coordinates()),
            risk_display: case.display_risk(),
            health_visits: case.visits_newest_first(),
            timeline: build_timeline(&case, &messages, Utc::now()),
            tab: view.tab,
            live: view.subscription().is_active(),
            messages,
            case,
        })
    }

    /// Closes the panel. Returns whether one was open.
    pub async fn close_panel(&self) -> bool {
        let closed = self.session.lock().await.close_detail();
        if closed {
            tracing::debug!("Detail panel closed");
        }
        closed
    }

    /// Runs `action` unless another mutation of the same case is in flight.
    async fn exclusive<T, F>(&self, case_id: &str, action: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let entry = self
            .in_flight
            .entry(case_id.to_string())
            .or_insert(Utc::now().timestamp_millis())
            .await;
        if !entry.is_fresh() {
            return Err(AppError::Conflict(format!(
                "Another action on case {} is still running",
                case_id
            )));
        }

        let result = action.await;
        self.in_flight.invalidate(case_id).await;
        result
    }

    async fn store_update(&self, case_id: &str, update: CaseUpdate) -> Result<Case, AppError> {
        let stored = self
            .exclusive(case_id, self.backend.update_case(case_id, &update))
            .await?;

        let mut session = self.session.lock().await;
        session.feed.patch(case_id, |held| *held = stored.clone());
        session.patch_open_snapshot(&stored);
        Ok(stored)
    }

    /// Assigns the case to `volunteer_name` and moves it to in progress.
    pub async fn accept(&self, case_id: &str, volunteer_name: &str) -> Result<Case, AppError> {
        self.backend.ensure_writable().context("Accepting case")?;

        let name = volunteer_name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest(
                "A volunteer name is required to accept a case".to_string(),
            ));
        }

        let case = Self::loaded_case(&*self.session.lock().await, case_id)?;
        if case.status != CaseStatus::AwaitingVolunteer {
            return Err(AppError::Conflict(format!(
                "Case {} is no longer awaiting a volunteer",
                case_id
            )));
        }

        let stored = self
            .store_update(case_id, CaseUpdate::accept(name))
            .await
            .context("Accepting case")?;
        tracing::info!("Case {} accepted by {}", case_id, name);
        Ok(stored)
    }

    pub async fn complete(&self, case_id: &str) -> Result<Case, AppError> {
        self.backend.ensure_writable().context("Completing case")?;

        let case = Self::loaded_case(&*self.session.lock().await, case_id)?;
        if case.status == CaseStatus::Completed {
            return Err(AppError::Conflict(format!(
                "Case {} is already completed",
                case_id
            )));
        }

        let stored = self
            .store_update(case_id, CaseUpdate::complete())
            .await
            .context("Completing case")?;
        tracing::info!("Case {} completed", case_id);
        Ok(stored)
    }

    /// Sends a volunteer message on the open case. The stored row comes
    /// back through the subscription.
    pub async fn send_message(&self, content: &str) -> Result<(), AppError> {
        self.backend.ensure_writable().context("Sending message")?;

        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message is empty".to_string()));
        }

        let case_id = self
            .session
            .lock()
            .await
            .detail()
            .map(|view| view.case_id.clone())
            .ok_or_else(|| AppError::BadRequest("No case is open".to_string()))?;

        self.backend
            .insert_message(&NewMessage {
                demand_id: case_id,
                sender: Sender::Volunteer,
                content: content.to_string(),
            })
            .await
            .context("Sending message")
    }

    /// Records a simulated call to the guardian as a system message.
    pub async fn simulate_call(&self, case_id: &str) -> Result<(), AppError> {
        self.backend.ensure_writable().context("Simulating call")?;
        Self::loaded_case(&*self.session.lock().await, case_id)?;

        self.backend
            .insert_message(&NewMessage {
                demand_id: case_id.to_string(),
                sender: Sender::System,
                content: SIMULATED_CALL_MESSAGE.to_string(),
            })
            .await
            .context("Simulating call")
    }
}
