/// Integration tests with a mocked hosted backend
/// Exercises the session end to end without a real project
use rota_feed::backend::Backend;
use rota_feed::config::{Config, SupabaseCredentials};
use rota_feed::errors::AppError;
use rota_feed::models::{CaseStatus, DetailTab};
use rota_feed::service::{FeedService, SIMULATED_CALL_MESSAGE};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const ANON_KEY: &str = "test-anon-key";

/// Helper function to create a test config against the mock server
fn create_test_config(base_url: String, page_size: u32) -> Config {
    Config {
        supabase: Some(SupabaseCredentials {
            url: base_url,
            anon_key: ANON_KEY.to_string(),
        }),
        page_size,
        realtime_poll_interval_ms: 100,
        backend_timeout_secs: 5,
        ..Config::default()
    }
}

fn create_service(config: &Config) -> FeedService {
    let backend = Backend::from_config(config).expect("backend");
    FeedService::new(backend, config, None)
}

fn case_row(id: &str, status: &str, volunteer: Option<&str>) -> Value {
    json!({
        "id": id,
        "created_at": "2025-03-01T12:00:00+00:00",
        "student_name": format!("Aluno {}", id),
        "student_age": 12,
        "guardian_name": "Joana",
        "contact_phone": "+5511977776666",
        "preferred_channel": "ligacao",
        "city": "São Paulo",
        "geo_lat": -23.56,
        "geo_lng": -46.64,
        "risk_score": 72.5,
        "suggested_problem": "transporte",
        "consent_granted_at": "2025-02-20",
        "status": status,
        "assigned_volunteer_name": volunteer
    })
}

fn message_row(id: &str, case_id: &str, at: &str, sender: &str, content: &str) -> Value {
    json!({
        "id": id,
        "created_at": at,
        "demand_id": case_id,
        "sender": sender,
        "content": content
    })
}

async fn mount_first_page(server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/demands"))
        .and(query_param("offset", "0"))
        .and(header("apikey", ANON_KEY))
        .and(header("Authorization", format!("Bearer {}", ANON_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pages_accumulate_until_short_page() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([
            case_row("c1", "aguardando_voluntario", None),
            case_row("c2", "aguardando_voluntario", None)
        ]),
    )
    .await;

    // The second page repeats c2 with a newer status
    Mock::given(method("GET"))
        .and(path("/rest/v1/demands"))
        .and(query_param("offset", "2"))
        .and(query_param("limit", "2"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            case_row("c2", "em_progresso", Some("Ana")),
        ])))
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 2));

    let feed = service.load_first_page().await.unwrap();
    assert_eq!(feed.loaded, 2);
    assert!(feed.has_more);
    assert!(!feed.offline);

    let feed = service.load_next_page().await.unwrap();
    assert_eq!(feed.loaded, 2);
    assert_eq!(feed.page, 1);
    assert!(!feed.has_more);
    let c2 = feed.items.iter().find(|i| i.case.id == "c2").unwrap();
    assert_eq!(c2.case.status, CaseStatus::InProgress);

    // Exhausted: no further request
    let feed = service.load_next_page().await.unwrap();
    assert_eq!(feed.page, 1);
}

#[tokio::test]
async fn test_failed_page_keeps_list_and_records_error() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([
            case_row("c1", "aguardando_voluntario", None),
            case_row("c2", "aguardando_voluntario", None)
        ]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/demands"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 2));
    service.load_first_page().await.unwrap();

    let err = service.load_next_page().await.unwrap_err();
    assert!(matches!(err.root(), AppError::BackendError(_)));

    let feed = service.feed().await;
    assert_eq!(feed.loaded, 2);
    assert_eq!(feed.page, 0);
    assert!(feed.has_more);
    assert!(feed.error.is_some());
    assert!(service.status().await.error.is_some());

    service.dismiss_error().await;
    assert!(service.feed().await.error.is_none());
}

#[tokio::test]
async fn test_reload_clears_dismissals() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "aguardando_voluntario", None)]),
    )
    .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let feed = service.dismiss("c1").await;
    assert!(feed.items.is_empty());
    assert_eq!(feed.loaded, 1);

    let feed = service.reload().await.unwrap();
    assert_eq!(feed.items.len(), 1);
}

#[tokio::test]
async fn test_accept_updates_backend_and_feed() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "aguardando_voluntario", None)]),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/demands"))
        .and(query_param("id", "eq.c1"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "status": "em_progresso",
            "assigned_volunteer_name": "Ana"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            case_row("c1", "em_progresso", Some("Ana"))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let stored = service.accept("c1", "  Ana ").await.unwrap();
    assert_eq!(stored.status, CaseStatus::InProgress);
    assert_eq!(stored.assigned_volunteer_name.as_deref(), Some("Ana"));

    let feed = service.feed().await;
    assert_eq!(feed.items[0].case.status, CaseStatus::InProgress);

    // No longer awaiting: a second accept is refused locally
    let err = service.accept("c1", "Bia").await.unwrap_err();
    assert!(matches!(err.root(), AppError::Conflict(_)));
}

#[tokio::test]
async fn test_accept_validates_input() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "aguardando_voluntario", None)]),
    )
    .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let err = service.accept("c1", "   ").await.unwrap_err();
    assert!(matches!(err.root(), AppError::BadRequest(_)));

    let err = service.accept("missing", "Ana").await.unwrap_err();
    assert!(matches!(err.root(), AppError::NotFound(_)));
}

#[tokio::test]
async fn test_complete_moves_case_to_completed() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "em_progresso", Some("Ana"))]),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/demands"))
        .and(query_param("id", "eq.c1"))
        .and(body_partial_json(json!({ "status": "concluida" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            case_row("c1", "concluida", Some("Ana"))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let stored = service.complete("c1").await.unwrap();
    assert_eq!(stored.status, CaseStatus::Completed);

    let err = service.complete("c1").await.unwrap_err();
    assert!(matches!(err.root(), AppError::Conflict(_)));
}

#[tokio::test]
async fn test_open_case_receives_pushed_messages() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "em_progresso", Some("Ana"))]),
    )
    .await;

    let first = message_row("m1", "c1", "2025-03-02T10:00:00+00:00", "familia", "Oi");
    let second = message_row("m2", "c1", "2025-03-02T10:05:00+00:00", "voluntario", "Olá!");

    // Initial load
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("demand_id", "eq.c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first.clone()])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // Later polls: the boundary row comes back with the new one
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("demand_id", "eq.c1"))
        .and(query_param("created_at", "gte.2025-03-02T10:00:00.000000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first, second])))
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let detail = service.open_case("c1", DetailTab::Chat).await.unwrap();
    assert_eq!(detail.tab, DetailTab::Chat);
    assert_eq!(detail.messages.len(), 1);
    assert!(!detail.timeline.is_empty());
    assert!(detail.live);

    let mut delivered = 1;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        delivered = service.detail().await.unwrap().messages.len();
        if delivered >= 2 {
            break;
        }
    }
    assert_eq!(delivered, 2);

    // Polling keeps running but never re-delivers
    tokio::time::sleep(Duration::from_millis(300)).await;
    let detail = service.detail().await.unwrap();
    let ids: Vec<_> = detail.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    assert!(service.close_panel().await);
    assert!(service.detail().await.is_err());
}

/// Message polls received so far for one case.
fn message_polls(requests: &[Request], case_id: &str) -> usize {
    let filter = format!("eq.{}", case_id);
    requests
        .iter()
        .filter(|r| r.url.path() == "/rest/v1/messages")
        .filter(|r| {
            r.url
                .query_pairs()
                .any(|(k, v)| k == "demand_id" && v == filter.as_str())
        })
        .count()
}

async fn polls_so_far(server: &MockServer, case_id: &str) -> usize {
    let requests = server.received_requests().await.unwrap_or_default();
    message_polls(&requests, case_id)
}

#[tokio::test]
async fn test_subscription_stops_when_replaced_or_closed() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([
            case_row("c1", "em_progresso", Some("Ana")),
            case_row("c2", "aguardando_voluntario", None)
        ]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    service.open_case("c1", DetailTab::Chat).await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(polls_so_far(&mock_server, "c1").await >= 2);

    // Opening another case releases the first subscription
    let detail = service.open_case("c2", DetailTab::Details).await.unwrap();
    assert!(detail.live);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let c1_after_switch = polls_so_far(&mock_server, "c1").await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(polls_so_far(&mock_server, "c1").await, c1_after_switch);
    assert!(polls_so_far(&mock_server, "c2").await >= 2);

    // Closing the panel releases the second one
    assert!(service.close_panel().await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let c2_after_close = polls_so_far(&mock_server, "c2").await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(polls_so_far(&mock_server, "c2").await, c2_after_close);
}

#[tokio::test]
async fn test_send_message_and_simulated_call() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "em_progresso", Some("Ana"))]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(body_partial_json(json!({
            "demand_id": "c1",
            "sender": "voluntario",
            "content": "Posso ajudar amanhã"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(body_partial_json(json!({
            "demand_id": "c1",
            "sender": "sistema",
            "content": SIMULATED_CALL_MESSAGE
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    // Nothing open yet
    let err = service.send_message("Posso ajudar amanhã").await.unwrap_err();
    assert!(matches!(err.root(), AppError::BadRequest(_)));

    service.open_case("c1", DetailTab::Chat).await.unwrap();
    service.send_message("  Posso ajudar amanhã ").await.unwrap();
    service.simulate_call("c1").await.unwrap();

    let err = service.send_message("   ").await.unwrap_err();
    assert!(matches!(err.root(), AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_backend_rejection_surfaces_as_error() {
    let mock_server = MockServer::start().await;
    mount_first_page(
        &mock_server,
        json!([case_row("c1", "aguardando_voluntario", None)]),
    )
    .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/demands"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let service = create_service(&create_test_config(mock_server.uri(), 10));
    service.load_first_page().await.unwrap();

    let err = service.accept("c1", "Ana").await.unwrap_err();
    assert!(matches!(err.root(), AppError::BackendError(_)));

    // The held case is untouched
    let feed = service.feed().await;
    assert_eq!(feed.items[0].case.status, CaseStatus::AwaitingVolunteer);
}
