//! HTTP-level tests over the in-memory store.
//!
//! Covers permissions, catalog filters, image upload and the reservation
//! invariants (seat bounds, seat uniqueness, capacity arithmetic, ownership).

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use planetarium::{
    config::Config,
    models::NewUser,
    services::auth,
    store::{MemoryStore, Store},
    AppState,
};

const PASSWORD: &str = "orbit-42";

struct TestApp {
    router: Router,
    admin: String,
    user: String,
    other: String,
    media_root: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}

async fn create_user(state: &AppState, email: &str, is_staff: bool) -> String {
    let password_hash = auth::hash_password(PASSWORD, 4).await.unwrap();
    let user = state
        .store
        .create_user(NewUser {
            email: email.to_string(),
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            is_staff,
        })
        .await
        .unwrap();
    auth::issue_pair(&state.config.jwt, &user).unwrap().access
}

async fn setup() -> TestApp {
    let media_root = std::env::temp_dir().join(format!("planetarium-test-{}", Uuid::new_v4()));
    let mut config = Config::defaults().unwrap();
    config.auth.bcrypt_cost = 4;
    config.media.root = media_root.clone();

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let state = AppState::new(store, config);

    let admin = create_user(&state, "admin@planetarium.io", true).await;
    let user = create_user(&state, "vega@planetarium.io", false).await;
    let other = create_user(&state, "altair@planetarium.io", false).await;

    TestApp {
        router: planetarium::app(state),
        admin,
        user,
        other,
        media_root,
    }
}

async fn send_raw(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    content_type: Option<&str>,
    body: Body,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(content_type) = content_type {
        request = request.header(header::CONTENT_TYPE, content_type);
    }

    let response = app
        .router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = match body {
        Some(body) => {
            send_raw(
                app,
                method,
                path,
                token,
                Some("application/json"),
                Body::from(body.to_string()),
            )
            .await
        }
        None => send_raw(app, method, path, token, None, Body::empty()).await,
    };
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &TestApp, path: &str, body: Value) -> Value {
    let (status, value) = send(app, Method::POST, path, Some(&app.admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{path}: {value}");
    value
}

fn id(value: &Value) -> i64 {
    value["id"].as_i64().unwrap()
}

async fn session_fixture(app: &TestApp, rows: i32, seats_in_row: i32) -> i64 {
    let show = create(
        app,
        "/api/planetarium/astronomy_show",
        json!({"title": "Orion Nebula", "description": "Stellar nursery"}),
    )
    .await;
    let dome = create(
        app,
        "/api/planetarium/planetarium_dome",
        json!({"name": "Blue", "rows": rows, "seats_in_row": seats_in_row}),
    )
    .await;
    let session = create(
        app,
        "/api/planetarium/show_session",
        json!({
            "show_time": "2030-01-01T19:00:00",
            "astronomy_show": id(&show),
            "planetarium_dome": id(&dome),
        }),
    )
    .await;
    id(&session)
}

async fn tickets_available(app: &TestApp, session_id: i64) -> i64 {
    let (status, sessions) =
        send(app, Method::GET, "/api/planetarium/show_session", Some(&app.user), None).await;
    assert_eq!(status, StatusCode::OK);
    sessions
        .as_array()
        .unwrap()
        .iter()
        .find(|s| id(s) == session_id)
        .map(|s| s["tickets_available"].as_i64().unwrap())
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 120]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "planetarium-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/* ---------- permissions ---------- */

#[tokio::test]
async fn anonymous_requests_are_unauthorized() {
    let app = setup().await;
    for path in [
        "/api/planetarium/astronomy_show",
        "/api/planetarium/show_session",
        "/api/planetarium/reservation",
        "/api/user/me",
    ] {
        let (status, body) = send(&app, Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert!(body["detail"].is_string());
    }
}

#[tokio::test]
async fn only_staff_may_create_catalog_entries() {
    let app = setup().await;
    let payload = json!({"title": "Jupiter", "description": "Gas giant"});

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/planetarium/astronomy_show",
        Some(&app.user),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "You do not have permission to perform this action.");

    let created = create(&app, "/api/planetarium/astronomy_show", payload).await;
    assert_eq!(created["title"], "Jupiter");
    assert_eq!(created["show_theme"], json!([]));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/planetarium/planetarium_dome",
        Some(&app.user),
        Some(json!({"name": "Red", "rows": 2, "seats_in_row": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn astronomy_show_cannot_be_replaced_or_deleted() {
    let app = setup().await;
    let show = create(
        &app,
        "/api/planetarium/astronomy_show",
        json!({"title": "Saturn"}),
    )
    .await;
    let path = format!("/api/planetarium/astronomy_show/{}", id(&show));

    let (status, _) = send(&app, Method::PUT, &path, Some(&app.admin), Some(json!({"title": "X"}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _) = send(&app, Method::DELETE, &path, Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, body) = send(&app, Method::GET, &path, Some(&app.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Saturn");
}

#[tokio::test]
async fn unknown_show_is_not_found() {
    let app = setup().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/planetarium/astronomy_show/999",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Not found.");
}

/* ---------- catalog ---------- */

#[tokio::test]
async fn shows_filter_by_theme_ids_and_title() {
    let app = setup().await;
    let planets = id(&create(&app, "/api/planetarium/show_themes", json!({"name": "Planets"})).await);
    let stars = id(&create(&app, "/api/planetarium/show_themes", json!({"name": "Stars"})).await);
    let comets = id(&create(&app, "/api/planetarium/show_themes", json!({"name": "Comets"})).await);

    create(&app, "/api/planetarium/astronomy_show", json!({"title": "Mars", "show_theme": [planets]})).await;
    create(&app, "/api/planetarium/astronomy_show", json!({"title": "Orion", "show_theme": [stars]})).await;
    create(&app, "/api/planetarium/astronomy_show", json!({"title": "Halley", "show_theme": [comets]})).await;
    create(
        &app,
        "/api/planetarium/astronomy_show",
        json!({"title": "Solar System Tour", "show_theme": [planets, stars]}),
    )
    .await;

    let path = format!("/api/planetarium/astronomy_show?show_theme={planets},%20{stars}");
    let (status, body) = send(&app, Method::GET, &path, Some(&app.user), None).await;
    assert_eq!(status, StatusCode::OK);
    let mut titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    titles.sort();
    assert_eq!(titles, ["Mars", "Orion", "Solar System Tour"]);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/planetarium/astronomy_show?title=ORI",
        Some(&app.user),
        None,
    )
    .await;
    let shows = body.as_array().unwrap();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0]["title"], "Orion");
    assert_eq!(shows[0]["show_theme"], json!(["Stars"]));

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/planetarium/astronomy_show?show_theme=abc",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dome_reports_capacity_and_rejects_empty_rows() {
    let app = setup().await;
    let dome = create(
        &app,
        "/api/planetarium/planetarium_dome",
        json!({"name": "Green", "rows": 12, "seats_in_row": 20}),
    )
    .await;
    assert_eq!(dome["capacity"], 240);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/planetarium/planetarium_dome",
        Some(&app.admin),
        Some(json!({"name": "Broken", "rows": 0, "seats_in_row": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["rows"].is_array());
}

#[tokio::test]
async fn sessions_filter_by_date_and_show() {
    let app = setup().await;
    let session_id = session_fixture(&app, 2, 2).await;

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/planetarium/show_session?date=2030-01-01",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(id(&body[0]), session_id);
    assert_eq!(body[0]["astronomy_show_title"], "Orion Nebula");
    assert_eq!(body[0]["planetarium_dome_capacity"], 4);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/planetarium/show_session?date=2030-01-02",
        Some(&app.user),
        None,
    )
    .await;
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/planetarium/show_session?date=yesterday",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/* ---------- images ---------- */

#[tokio::test]
async fn upload_rejects_non_images() {
    let app = setup().await;
    let show = create(&app, "/api/planetarium/astronomy_show", json!({"title": "Venus"})).await;
    let path = format!("/api/planetarium/astronomy_show/{}/upload-image", id(&show));

    let (content_type, body) = multipart("image", "notes.txt", b"definitely not a picture");
    let (status, bytes) = send_raw(
        &app,
        Method::POST,
        &path,
        Some(&app.admin),
        Some(&content_type),
        Body::from(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(errors["image"].is_array());

    let (content_type, body) = multipart("image", "venus.png", &png_bytes());
    let (status, _) = send_raw(
        &app,
        Method::POST,
        &path,
        Some(&app.user),
        Some(&content_type),
        Body::from(body),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn uploaded_image_is_served_back() {
    let app = setup().await;
    let show = create(&app, "/api/planetarium/astronomy_show", json!({"title": "Venus"})).await;
    let path = format!("/api/planetarium/astronomy_show/{}/upload-image", id(&show));
    let png = png_bytes();

    let (content_type, body) = multipart("image", "venus.png", &png);
    let (status, bytes) = send_raw(
        &app,
        Method::POST,
        &path,
        Some(&app.admin),
        Some(&content_type),
        Body::from(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uploaded: Value = serde_json::from_slice(&bytes).unwrap();
    let url = uploaded["image"].as_str().unwrap().to_string();
    assert!(url.starts_with("/media/uploads/astronomy_show/venus-"));

    let (status, served) = send_raw(&app, Method::GET, &url, None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, png);

    let (_, detail) = send(
        &app,
        Method::GET,
        &format!("/api/planetarium/astronomy_show/{}", id(&show)),
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(detail["image"], url.as_str());
}

/* ---------- reservations ---------- */

#[tokio::test]
async fn reservation_reduces_available_tickets() {
    let app = setup().await;
    let session = session_fixture(&app, 2, 3).await;
    assert_eq!(tickets_available(&app, session).await, 6);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.user),
        Some(json!({"tickets": [
            {"row": 1, "seat": 2, "show_session": session},
            {"row": 1, "seat": 1, "show_session": session},
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["tickets"].as_array().unwrap().len(), 2);
    assert_eq!(body["tickets"][0]["seat"], 1);
    assert_eq!(tickets_available(&app, session).await, 4);

    let (_, detail) = send(
        &app,
        Method::GET,
        &format!("/api/planetarium/show_session/{session}"),
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(detail["taken_places"], json!([{"row": 1, "seat": 1}, {"row": 1, "seat": 2}]));
    assert_eq!(detail["planetarium_dome"]["capacity"], 6);
}

#[tokio::test]
async fn taken_seat_cannot_be_booked_twice() {
    let app = setup().await;
    let session = session_fixture(&app, 2, 2).await;
    let ticket = json!({"tickets": [{"row": 2, "seat": 2, "show_session": session}]});

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.user),
        Some(ticket.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.other),
        Some(ticket),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["tickets.0.non_field_errors"].is_array());
    assert_eq!(tickets_available(&app, session).await, 3);
}

#[tokio::test]
async fn seat_outside_dome_fails_and_leaves_nothing_behind() {
    let app = setup().await;
    let session = session_fixture(&app, 2, 2).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.user),
        Some(json!({"tickets": [
            {"row": 1, "seat": 1, "show_session": session},
            {"row": 3, "seat": 1, "show_session": session},
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["tickets.1.row"][0]
        .as_str()
        .unwrap()
        .contains("(1, 2)"));

    assert_eq!(tickets_available(&app, session).await, 4);
    let (_, page) = send(&app, Method::GET, "/api/planetarium/reservation", Some(&app.user), None).await;
    assert_eq!(page["count"], 0);
}

#[tokio::test]
async fn malformed_reservations_are_rejected() {
    let app = setup().await;
    let session = session_fixture(&app, 2, 2).await;

    for payload in [
        json!({"tickets": []}),
        json!({"tickets": [{"row": 0, "seat": 1, "show_session": session}]}),
        json!({"tickets": [{"row": 1, "seat": 1, "show_session": 9999}]}),
        json!({"tickets": [
            {"row": 1, "seat": 1, "show_session": session},
            {"row": 1, "seat": 1, "show_session": session},
        ]}),
    ] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/planetarium/reservation",
            Some(&app.user),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload} -> {body}");
    }
    assert_eq!(tickets_available(&app, session).await, 4);
}

#[tokio::test]
async fn reservations_are_private_and_paginated() {
    let app = setup().await;
    let session = session_fixture(&app, 4, 4).await;

    for seat in 1..=4 {
        for row in 1..=3 {
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/planetarium/reservation",
                Some(&app.user),
                Some(json!({"tickets": [{"row": row, "seat": seat, "show_session": session}]})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.other),
        Some(json!({"tickets": [{"row": 4, "seat": 4, "show_session": session}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, first) = send(&app, Method::GET, "/api/planetarium/reservation", Some(&app.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["count"], 12);
    assert_eq!(first["results"].as_array().unwrap().len(), 10);
    assert_eq!(first["next"], 2);
    assert_eq!(first["previous"], Value::Null);
    let ticket = &first["results"][0]["tickets"][0];
    assert_eq!(ticket["show_session"]["id"], session);
    assert_eq!(ticket["show_session"]["tickets_available"], 3);

    let (_, second) = send(
        &app,
        Method::GET,
        "/api/planetarium/reservation?page=2",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(second["results"].as_array().unwrap().len(), 2);
    assert_eq!(second["next"], Value::Null);
    assert_eq!(second["previous"], 1);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/planetarium/reservation?page=3",
        Some(&app.user),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, theirs) = send(&app, Method::GET, "/api/planetarium/reservation", Some(&app.other), None).await;
    assert_eq!(theirs["count"], 1);
    assert_eq!(theirs["results"][0]["tickets"][0]["row"], 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_bookings_of_one_seat_have_a_single_winner() {
    let app = Arc::new(setup().await);
    let session = session_fixture(&app, 3, 3).await;

    let mut handles = Vec::new();
    for attempt in 0..16 {
        let app = Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            let token: &str = if attempt % 2 == 0 { &app.user } else { &app.other };
            let (status, _) = send(
                &app,
                Method::POST,
                "/api/planetarium/reservation",
                Some(token),
                Some(json!({"tickets": [{"row": 2, "seat": 2, "show_session": session}]})),
            )
            .await;
            status
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::BAD_REQUEST),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(tickets_available(&app, session).await, 8);
}

#[tokio::test]
async fn session_cannot_move_to_dome_that_cuts_issued_tickets() {
    let app = setup().await;
    let session = session_fixture(&app, 3, 3).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.user),
        Some(json!({"tickets": [{"row": 3, "seat": 3, "show_session": session}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let small = create(
        &app,
        "/api/planetarium/planetarium_dome",
        json!({"name": "Small", "rows": 2, "seats_in_row": 2}),
    )
    .await;
    let large = create(
        &app,
        "/api/planetarium/planetarium_dome",
        json!({"name": "Large", "rows": 5, "seats_in_row": 5}),
    )
    .await;
    let path = format!("/api/planetarium/show_session/{session}");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &path,
        Some(&app.admin),
        Some(json!({"planetarium_dome": id(&small)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["planetarium_dome"].is_array());

    let (_, detail) = send(&app, Method::GET, &path, Some(&app.user), None).await;
    assert_eq!(detail["planetarium_dome"]["name"], "Blue");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &path,
        Some(&app.admin),
        Some(json!({"planetarium_dome": id(&large)})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["planetarium_dome"], id(&large));
    assert_eq!(body["show_time"], "2030-01-01T19:00:00");
    assert_eq!(tickets_available(&app, session).await, 24);
}

#[tokio::test]
async fn deleting_session_frees_its_seats() {
    let app = setup().await;
    let session = session_fixture(&app, 1, 1).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/planetarium/reservation",
        Some(&app.user),
        Some(json!({"tickets": [{"row": 1, "seat": 1, "show_session": session}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let path = format!("/api/planetarium/show_session/{session}");
    let (status, _) = send(&app, Method::DELETE, &path, Some(&app.user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::DELETE, &path, Some(&app.admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &path, Some(&app.user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/* ---------- users ---------- */

#[tokio::test]
async fn register_login_and_refresh() {
    let app = setup().await;

    let (status, user) = send(
        &app,
        Method::POST,
        "/api/user/register",
        None,
        Some(json!({"email": " Sirius@Planetarium.io ", "password": "dogstar", "is_staff": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");
    assert_eq!(user["email"], "sirius@planetarium.io");
    assert_eq!(user["is_staff"], false);
    assert!(user.get("password").is_none());

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user/register",
        None,
        Some(json!({"email": "sirius@planetarium.io", "password": "dogstar"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user/token",
        None,
        Some(json!({"email": "sirius@planetarium.io", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, pair) = send(
        &app,
        Method::POST,
        "/api/user/token",
        None,
        Some(json!({"email": "sirius@planetarium.io", "password": "dogstar"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = pair["access"].as_str().unwrap().to_string();
    let refresh = pair["refresh"].as_str().unwrap().to_string();

    let (status, me) = send(&app, Method::GET, "/api/user/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "sirius@planetarium.io");

    // refresh-токен не открывает API
    let (status, _) = send(&app, Method::GET, "/api/user/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/user/token/refresh",
        None,
        Some(json!({"refresh": access})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, renewed) = send(
        &app,
        Method::POST,
        "/api/user/token/refresh",
        None,
        Some(json!({"refresh": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(renewed["access"].is_string());
}

#[tokio::test]
async fn basic_auth_and_profile_update() {
    let app = setup().await;
    let credentials = general_purpose::STANDARD.encode(format!("vega@planetarium.io:{PASSWORD}"));

    let request = Request::builder()
        .uri("/api/user/me")
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // тот же вход, email в другом регистре
    let credentials = general_purpose::STANDARD.encode(format!(" Vega@Planetarium.IO:{PASSWORD}"));
    let request = Request::builder()
        .uri("/api/user/me")
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, me) = send(
        &app,
        Method::PATCH,
        "/api/user/me",
        Some(&app.user),
        Some(json!({"first_name": "Vega", "last_name": "Lyrae"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["first_name"], "Vega");
    assert_eq!(me["email"], "vega@planetarium.io");

    let (status, _) = send(
        &app,
        Method::PATCH,
        "/api/user/me",
        Some(&app.user),
        Some(json!({"email": "altair@planetarium.io"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
