/// Property-based tests using proptest
/// Invariants of distances, merging and the feed pipeline
use proptest::prelude::*;
use rota_feed::feed::merge_by_id;
use rota_feed::geo::{distance_km, Coordinates};
use rota_feed::models::{Case, CaseStatus, SuggestedCategory};
use rota_feed::pipeline::{
    compute_visible_list, matches_category, matches_status, matches_text, FeedFilters, SortMode,
    StatusFilter,
};
use std::collections::HashSet;

fn case(id: &str, risk: f64, status: CaseStatus, lat: Option<f64>) -> Case {
    let mut case: Case = serde_json::from_value(serde_json::json!({
        "id": id,
        "created_at": "2025-03-01T12:00:00Z",
        "student_name": format!("Aluno {}", id),
        "student_age": 9,
        "guardian_name": "Responsável",
        "contact_phone": "+5511988887777",
        "preferred_channel": "sms",
        "status": "aguardando_voluntario"
    }))
    .expect("fixture case");
    case.risk_score = Some(risk);
    case.status = status;
    if status != CaseStatus::AwaitingVolunteer {
        case.assigned_volunteer_name = Some("Ana".into());
    }
    case.geo_lat = lat;
    case.geo_lng = lat.map(|_| 0.0);
    case.suggested_problem = match risk as u32 % 3 {
        0 => Some(SuggestedCategory::Transport),
        1 => Some(SuggestedCategory::Tutoring),
        _ => None,
    };
    case
}

fn arb_coordinates() -> impl Strategy<Value = Coordinates> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| Coordinates::new(lat, lng))
}

fn arb_status() -> impl Strategy<Value = CaseStatus> {
    prop_oneof![
        Just(CaseStatus::AwaitingVolunteer),
        Just(CaseStatus::InProgress),
        Just(CaseStatus::Completed),
    ]
}

fn arb_cases() -> impl Strategy<Value = Vec<Case>> {
    prop::collection::vec(
        (0u8..20, 0.0f64..100.0, arb_status(), prop::option::of(-1.0f64..1.0)),
        0..25,
    )
    .prop_map(|rows| {
        let mut seen = HashSet::new();
        rows.into_iter()
            .filter(|(id, ..)| seen.insert(*id))
            .map(|(id, risk, status, lat)| case(&format!("c{}", id), risk, status, lat))
            .collect()
    })
}

fn arb_status_filter() -> impl Strategy<Value = StatusFilter> {
    prop_oneof![
        Just(StatusFilter::All),
        Just(StatusFilter::Awaiting),
        Just(StatusFilter::Mine),
        Just(StatusFilter::Completed),
    ]
}

// Property: distance is symmetric and zero on identical points
proptest! {
    #[test]
    fn distance_is_symmetric(a in arb_coordinates(), b in arb_coordinates()) {
        prop_assert_eq!(distance_km(Some(a), Some(b)), distance_km(Some(b), Some(a)));
    }

    #[test]
    fn distance_to_self_is_zero(a in arb_coordinates()) {
        prop_assert_eq!(distance_km(Some(a), Some(a)), Some(0.0));
    }

    #[test]
    fn distance_is_bounded(a in arb_coordinates(), b in arb_coordinates()) {
        let d = distance_km(Some(a), Some(b)).unwrap();
        // Half the Earth's circumference, plus rounding
        prop_assert!((0.0..=20_015.2).contains(&d));
    }
}

// Property: merging keeps one entry per id, with the latest record winning
proptest! {
    #[test]
    fn merge_yields_unique_ids(existing in arb_cases(), incoming in arb_cases()) {
        let merged = merge_by_id(existing.clone(), incoming.clone());
        let unique: HashSet<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        prop_assert_eq!(unique.len(), merged.len());

        let expected: HashSet<&str> = existing
            .iter()
            .chain(incoming.iter())
            .map(|c| c.id.as_str())
            .collect();
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn merge_prefers_incoming(existing in arb_cases(), incoming in arb_cases()) {
        let merged = merge_by_id(existing, incoming.clone());
        for case in &incoming {
            let held = merged.iter().find(|c| c.id == case.id).unwrap();
            prop_assert_eq!(held, case);
        }
    }

    #[test]
    fn merge_is_idempotent(existing in arb_cases(), incoming in arb_cases()) {
        let once = merge_by_id(existing, incoming.clone());
        let twice = merge_by_id(once.clone(), incoming);
        prop_assert_eq!(once, twice);
    }
}

// Property: the pipeline is a deterministic, narrowing function
proptest! {
    #[test]
    fn pipeline_is_deterministic(cases in arb_cases(), status in arb_status_filter()) {
        let filters = FeedFilters {
            status,
            viewer: Some(Coordinates::new(0.0, 0.0)),
            radius_km: 60.0,
            ..FeedFilters::default()
        };
        let first: Vec<_> = compute_visible_list(&cases, &filters, &HashSet::new())
            .iter()
            .map(|v| v.case.id.clone())
            .collect();
        let second: Vec<_> = compute_visible_list(&cases, &filters, &HashSet::new())
            .iter()
            .map(|v| v.case.id.clone())
            .collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn shrinking_radius_never_adds_cases(cases in arb_cases(), small in 0.0f64..50.0, extra in 0.0f64..100.0) {
        let viewer = Some(Coordinates::new(0.0, 0.0));
        let narrow = FeedFilters { viewer, radius_km: small, ..FeedFilters::default() };
        let wide = FeedFilters { viewer, radius_km: small + extra, ..FeedFilters::default() };

        let narrow_ids: HashSet<String> = compute_visible_list(&cases, &narrow, &HashSet::new())
            .iter()
            .map(|v| v.case.id.clone())
            .collect();
        let wide_ids: HashSet<String> = compute_visible_list(&cases, &wide, &HashSet::new())
            .iter()
            .map(|v| v.case.id.clone())
            .collect();
        prop_assert!(narrow_ids.is_subset(&wide_ids));
    }

    #[test]
    fn status_filters_partition_by_status(cases in arb_cases(), status in arb_status_filter()) {
        let filters = FeedFilters { status, ..FeedFilters::default() };
        for visible in compute_visible_list(&cases, &filters, &HashSet::new()) {
            let ok = match status {
                StatusFilter::All => true,
                StatusFilter::Awaiting => visible.case.status == CaseStatus::AwaitingVolunteer,
                StatusFilter::Mine => visible.case.status == CaseStatus::InProgress,
                StatusFilter::Completed => visible.case.status == CaseStatus::Completed,
            };
            prop_assert!(ok);
        }
    }

    #[test]
    fn dismissed_cases_never_appear(cases in arb_cases(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!cases.is_empty());
        let dismissed_id = cases[pick.index(cases.len())].id.clone();
        let dismissed: HashSet<String> = [dismissed_id.clone()].into_iter().collect();
        let visible = compute_visible_list(&cases, &FeedFilters::default(), &dismissed);
        prop_assert!(visible.iter().all(|v| v.case.id != dismissed_id));
        prop_assert_eq!(visible.len(), cases.len() - 1);
    }

    #[test]
    fn risk_sort_is_stable_and_descending(cases in arb_cases()) {
        let filters = FeedFilters { sort: SortMode::HighestRisk, ..FeedFilters::default() };
        let visible = compute_visible_list(&cases, &filters, &HashSet::new());
        for pair in visible.windows(2) {
            let (a, b) = (pair[0].case, pair[1].case);
            prop_assert!(a.risk_score >= b.risk_score);
            if a.risk_score == b.risk_score {
                let pos = |id: &str| cases.iter().position(|c| c.id == id);
                prop_assert!(pos(&a.id) < pos(&b.id));
            }
        }
    }

    #[test]
    fn filter_stages_commute(cases in arb_cases(), status in arb_status_filter(), query in "[a-z0-9 ]{0,3}") {
        let query = query.trim().to_lowercase();
        let categories = [SuggestedCategory::Transport];
        let forward: Vec<&str> = cases
            .iter()
            .filter(|c| matches_text(c, &query))
            .filter(|c| matches_status(c, status, None))
            .filter(|c| matches_category(c, &categories))
            .map(|c| c.id.as_str())
            .collect();
        let backward: Vec<&str> = cases
            .iter()
            .filter(|c| matches_category(c, &categories))
            .filter(|c| matches_status(c, status, None))
            .filter(|c| matches_text(c, &query))
            .map(|c| c.id.as_str())
            .collect();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn adding_filters_never_grows_output(cases in arb_cases(), status in arb_status_filter(), query in "[a-z0-9]{0,2}") {
        let base = FeedFilters::default();
        let with_status = FeedFilters { status, ..base.clone() };
        let with_text = FeedFilters { search: query, ..with_status.clone() };
        let with_category = FeedFilters {
            categories: vec![SuggestedCategory::Tutoring],
            ..with_text.clone()
        };

        let lens: Vec<usize> = [base, with_status, with_text, with_category]
            .iter()
            .map(|f| compute_visible_list(&cases, f, &HashSet::new()).len())
            .collect();
        prop_assert!(lens.windows(2).all(|w| w[0] >= w[1]));
    }
}
