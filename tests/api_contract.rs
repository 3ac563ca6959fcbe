use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use keci_dashboard::config::{Config, StorageLocation};
use keci_dashboard::routes::create_routes;
use keci_dashboard::services::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const FEED: &str = r#"{
    "updated_date": "2025-01-15 09:00",
    "overall_risk": {"class": "danger", "text": "고위험", "score": 3.0},
    "indicators": {
        "exchange_rate": {"name": "원/달러 환율", "unit": "원", "value": 1450.0, "min": 1100, "max": 1600,
            "risk_class": "danger", "risk_text": "위험", "description": "USD/KRW", "date": "20250115"}
    },
    "poll": {"question": "향후 경기 전망은?", "options": ["좋아진다", "비슷하다", "나빠진다"], "active": true}
}"#;

async fn app_with_feed(feed: Option<&str>) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("indicators.json");
    if let Some(feed) = feed {
        std::fs::write(&feed_path, feed).unwrap();
    }

    let config = Config {
        port: 0,
        feed_source: feed_path.to_string_lossy().into_owned(),
        database: None,
        visitor_storage: StorageLocation::File(dir.path().join("visitors.json")),
    };
    (create_routes(AppState::build(&config).await), dir)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_local_backend() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let (status, body) = call(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "backend": "local"}));
}

#[tokio::test]
async fn dashboard_renders_feed_and_panels() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let visitor = Uuid::new_v4();

    let (status, body) = call(&app, get(&format!("/api/dashboard?visitor_id={visitor}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_risk"]["needle_angle"], json!(90.0));
    assert_eq!(body["overall_risk"]["score_label"], "위험 점수: 3.00 / 3.0");
    assert_eq!(body["indicators"][0]["value_label"], "1,450원");
    assert_eq!(body["indicators"][0]["bar_width"], json!(70.0));
    assert_eq!(body["reactions"]["state"], json!({"status": "unvoted"}));
    assert_eq!(body["poll"]["question"], "향후 경기 전망은?");
    assert_eq!(body["poll"]["options"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn reaction_vote_is_counted_once() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let visitor = Uuid::new_v4();

    let (status, body) = call(
        &app,
        post("/api/reactions", json!({"visitor_id": visitor, "reaction": "worried"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recorded"], true);
    assert_eq!(body["panel"]["reactions"][0]["count"], 1);
    assert_eq!(body["panel"]["disabled"], true);
    assert_eq!(body["panel"]["note"], "참여해주셔서 감사합니다! 🙏");

    let (status, body) = call(
        &app,
        post("/api/reactions", json!({"visitor_id": visitor, "reaction": "okay"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recorded"], false);
    assert_eq!(body["panel"]["reactions"][0]["count"], 1);
    assert_eq!(body["panel"]["reactions"][2]["count"], 0);
    assert_eq!(
        body["panel"]["state"],
        json!({"status": "voted", "choice": "worried"})
    );

    let (_, body) = call(&app, get(&format!("/api/reactions?visitor_id={visitor}"))).await;
    assert_eq!(body["note"], "오늘 이미 참여하셨습니다.");
}

#[tokio::test]
async fn poll_vote_reveals_results() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let other = Uuid::new_v4();
    let visitor = Uuid::new_v4();

    call(&app, post("/api/poll/votes", json!({"visitor_id": other, "option": 2}))).await;

    let (_, before) = call(&app, get(&format!("/api/poll?visitor_id={visitor}"))).await;
    assert_eq!(before["options"][2]["percent"], Value::Null);
    assert_eq!(before["total_label"], "총 1명 참여");

    let (status, body) = call(
        &app,
        post("/api/poll/votes", json!({"visitor_id": visitor, "option": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recorded"], true);
    assert_eq!(body["panel"]["options"][0]["percent"], 50);
    assert_eq!(body["panel"]["options"][0]["selected"], true);
    assert_eq!(body["panel"]["options"][2]["percent"], 50);
    assert_eq!(body["panel"]["total"], 2);
}

#[tokio::test]
async fn out_of_range_poll_option_is_rejected() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let visitor = Uuid::new_v4();

    let (status, body) = call(
        &app,
        post("/api/poll/votes", json!({"visitor_id": visitor, "option": 99})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("99"));

    let (_, poll) = call(&app, get(&format!("/api/poll?visitor_id={visitor}"))).await;
    assert_eq!(poll["total"], 0);
    assert_eq!(poll["state"], json!({"status": "unvoted"}));
}

#[tokio::test]
async fn inactive_poll_is_not_served() {
    let feed = FEED.replace("\"active\": true", "\"active\": false");
    let (app, _dir) = app_with_feed(Some(&feed)).await;
    let visitor = Uuid::new_v4();

    let (_, dashboard) = call(&app, get(&format!("/api/dashboard?visitor_id={visitor}"))).await;
    assert_eq!(dashboard["poll"], Value::Null);

    let (status, _) = call(
        &app,
        post("/api/poll/votes", json!({"visitor_id": visitor, "option": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_feed_disables_dashboard_and_voting() {
    let (app, _dir) = app_with_feed(None).await;
    let visitor = Uuid::new_v4();

    let (status, body) = call(&app, get(&format!("/api/dashboard?visitor_id={visitor}"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("데이터를 불러올 수 없습니다."));

    let (status, _) = call(
        &app,
        post("/api/reactions", json!({"visitor_id": visitor, "reaction": "okay"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = call(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn malformed_votes_get_the_error_body() {
    let (app, _dir) = app_with_feed(Some(FEED)).await;
    let visitor = Uuid::new_v4();

    for body in [
        json!({"visitor_id": visitor, "option": -1}),
        json!({"visitor_id": visitor, "option": 1.5}),
        json!({"visitor_id": visitor, "option": "first"}),
        json!({"visitor_id": "not-a-uuid", "option": 0}),
    ] {
        let (status, response) = call(&app, post("/api/poll/votes", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["error"]
            .as_str()
            .unwrap()
            .starts_with("잘못된 요청입니다."));
    }

    let (status, response) = call(
        &app,
        post("/api/reactions", json!({"visitor_id": visitor, "reaction": "angry"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].is_string());

    let (status, response) = call(&app, get("/api/poll?visitor_id=nope")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].is_string());

    let (_, poll) = call(&app, get(&format!("/api/poll?visitor_id={visitor}"))).await;
    assert_eq!(poll["total"], 0);
}

#[tokio::test]
async fn inactive_poll_error_is_korean() {
    let feed = FEED.replace("\"active\": true", "\"active\": false");
    let (app, _dir) = app_with_feed(Some(&feed)).await;

    let (status, body) = call(
        &app,
        get(&format!("/api/poll?visitor_id={}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "현재 진행 중인 설문이 없습니다.");
}
