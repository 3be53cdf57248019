//! Filter/sort pipeline over the accumulated case list.
//!
//! [`compute_visible_list`] is pure: the same cases, criteria and dismissed
//! set always produce the same ordered output. Each stage is also exposed as
//! its own predicate so callers can compose them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::geo::{distance_km, Coordinates};
use crate::models::{Case, CaseStatus, SuggestedCategory};

/// Default search radius. Large enough to keep the whole metro area.
pub const DEFAULT_RADIUS_KM: f64 = 999.0;

/// The four-way status selector shown to the volunteer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Awaiting,
    /// Cases in progress; restricted to one volunteer when a name is set.
    Mine,
    Completed,
}

/// Feed ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Nearest,
    HighestRisk,
    MostRecent,
}

/// What the geofence does with cases that have no coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingLocationPolicy {
    /// Keep them; their distance is unknown, not large.
    #[default]
    Include,
    Exclude,
}

impl std::str::FromStr for MissingLocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            other => Err(format!("unknown missing-location policy '{}'", other)),
        }
    }
}

/// User-selected criteria for the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedFilters {
    /// Free-text query over name, neighborhood and school.
    pub search: String,
    pub status: StatusFilter,
    /// Empty means no category restriction.
    pub categories: Vec<SuggestedCategory>,
    pub radius_km: f64,
    pub sort: SortMode,
    /// Viewer position; unknown disables the geofence.
    pub viewer: Option<Coordinates>,
    /// Name matched by [`StatusFilter::Mine`]. `None` keeps every in-progress case.
    pub volunteer_name: Option<String>,
    pub missing_location: MissingLocationPolicy,
}

impl Default for FeedFilters {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: StatusFilter::All,
            categories: Vec::new(),
            radius_km: DEFAULT_RADIUS_KM,
            sort: SortMode::Nearest,
            viewer: None,
            volunteer_name: None,
            missing_location: MissingLocationPolicy::Include,
        }
    }
}

/// Body of a filter change. Absent fields keep their current value.
///
/// The missing-location policy is deployment configuration and cannot be
/// changed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterUpdate {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub categories: Option<Vec<SuggestedCategory>>,
    pub radius_km: Option<f64>,
    pub sort: Option<SortMode>,
    pub viewer: Option<Coordinates>,
    pub volunteer_name: Option<String>,
}

impl FilterUpdate {
    /// Criteria after applying this change to `current`. A negative or
    /// non-finite radius is ignored.
    pub fn apply_to(self, current: &FeedFilters) -> FeedFilters {
        let radius_km = self
            .radius_km
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(current.radius_km);

        FeedFilters {
            search: self.search.unwrap_or_else(|| current.search.clone()),
            status: self.status.unwrap_or(current.status),
            categories: self
                .categories
                .unwrap_or_else(|| current.categories.clone()),
            radius_km,
            sort: self.sort.unwrap_or(current.sort),
            viewer: self.viewer.or(current.viewer),
            volunteer_name: self
                .volunteer_name
                .or_else(|| current.volunteer_name.clone()),
            missing_location: current.missing_location,
        }
    }
}

/// A case that survived filtering, with its distance from the viewer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VisibleCase<'a> {
    #[serde(flatten)]
    pub case: &'a Case,
    pub distance_km: Option<f64>,
}

/// Runs the whole pipeline: text, status, category, dismissal, geofence, sort.
pub fn compute_visible_list<'a>(
    cases: &'a [Case],
    filters: &FeedFilters,
    dismissed: &HashSet<String>,
) -> Vec<VisibleCase<'a>> {
    let query = filters.search.to_lowercase();

    let mut visible: Vec<VisibleCase<'a>> = cases
        .iter()
        .filter(|c| matches_text(c, &query))
        .filter(|c| matches_status(c, filters.status, filters.volunteer_name.as_deref()))
        .filter(|c| matches_category(c, &filters.categories))
        .filter(|c| !dismissed.contains(&c.id))
        .map(|c| VisibleCase {
            case: c,
            distance_km: distance_km(filters.viewer, c.coordinates()),
        })
        .filter(|v| {
            passes_geofence(
                filters.viewer.is_some(),
                v.distance_km,
                filters.radius_km,
                filters.missing_location,
            )
        })
        .collect();

    sort_visible(&mut visible, filters.sort);
    visible
}

/// Case-insensitive substring match. `query` must already be lowercased.
///
/// A blank query matches everything; any other query is matched as typed,
/// surrounding spaces included.
pub fn matches_text(case: &Case, query: &str) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    let hit = |field: Option<&str>| field.is_some_and(|f| f.to_lowercase().contains(query));
    hit(Some(case.student_name.as_str()))
        || hit(case.address_neighborhood.as_deref())
        || hit(case.school_name.as_deref())
}

pub fn matches_status(case: &Case, status: StatusFilter, volunteer_name: Option<&str>) -> bool {
    match status {
        StatusFilter::All => true,
        StatusFilter::Awaiting => case.status == CaseStatus::AwaitingVolunteer,
        StatusFilter::Completed => case.status == CaseStatus::Completed,
        StatusFilter::Mine => {
            if case.status != CaseStatus::InProgress {
                return false;
            }
            match volunteer_name.map(str::trim).filter(|n| !n.is_empty()) {
                None => true,
                Some(name) => case
                    .assigned_volunteer_name
                    .as_deref()
                    .is_some_and(|assigned| assigned.trim().to_lowercase() == name.to_lowercase()),
            }
        }
    }
}

pub fn matches_category(case: &Case, selected: &[SuggestedCategory]) -> bool {
    if selected.is_empty() {
        return true;
    }
    case.suggested_problem
        .is_some_and(|category| selected.contains(&category))
}

/// Geofence decision for one case.
pub fn passes_geofence(
    viewer_known: bool,
    distance: Option<f64>,
    radius_km: f64,
    policy: MissingLocationPolicy,
) -> bool {
    if !viewer_known {
        return true;
    }
    match distance {
        Some(d) => d <= radius_km,
        None => policy == MissingLocationPolicy::Include,
    }
}

/// Stable sort by the selected mode.
pub fn sort_visible(visible: &mut [VisibleCase<'_>], mode: SortMode) {
    match mode {
        SortMode::HighestRisk => visible.sort_by(|a, b| {
            b.case
                .risk_score
                .unwrap_or(0.0)
                .total_cmp(&a.case.risk_score.unwrap_or(0.0))
        }),
        SortMode::MostRecent => visible.sort_by(|a, b| b.case.created_at.cmp(&a.case.created_at)),
        SortMode::Nearest => visible.sort_by(|a, b| {
            a.distance_km
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.distance_km.unwrap_or(f64::INFINITY))
        }),
    }
}
