use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use epibuilder::handlers::{router, AppState};
use epibuilder::models::{Role, User};
use epibuilder::repository::{MemoryStore, UserRepository};
use epibuilder::services::{TaskService, UserService};
use epibuilder::worker::{JobQueue, JobReceiver};

const BOUNDARY: &str = "epibuilder-test-boundary";

struct TestApp {
    router: Router,
    store: MemoryStore,
    // Held so queued jobs have somewhere to go.
    jobs: JobReceiver,
}

fn test_app() -> TestApp {
    let store = MemoryStore::new();
    let (queue, jobs) = JobQueue::new(16);
    let state = AppState {
        tasks: TaskService::new(Arc::new(store.clone())),
        users: UserService::new(Arc::new(store.clone())).with_cost(4),
        jobs: queue,
    };
    TestApp {
        router: router(state, 1024 * 1024),
        store,
        jobs,
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        json!(null)
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!(null))
    };
    (status, cookie, body)
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn multipart_task(cookie: &str, fields: &[(&str, &str)], fasta: Option<&str>) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some(fasta) = fasta {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"fasta\"; filename=\"spike.fasta\"\r\nContent-Type: text/plain\r\n\r\n{fasta}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

const TASK_FIELDS: &[(&str, &str)] = &[
    ("task_name", "spike scan"),
    ("run_name", "run-1"),
    ("action", "PREDICT"),
    ("bepipred_min", "0.5"),
    ("bepipred_max", "0.9"),
    ("min_epitope_length", "8"),
    ("max_epitope_length", "20"),
    ("subcell", "Secreted"),
    ("interpro", "IPR000001"),
    ("epitope_search", ""),
];

async fn register_and_login(app: &TestApp, username: &str) -> String {
    let (status, _, body) = send(
        &app.router,
        form(
            "/register",
            &format!("name={username}&username={username}&password=pw&confirm_password=pw&role=RESEARCHER"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "RESEARCHER");
    assert!(body.get("password_hash").is_none());

    login(app, username).await
}

async fn login(app: &TestApp, username: &str) -> String {
    let (status, cookie, _) = send(
        &app.router,
        form("/login", &format!("username={username}&password=pw")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    cookie.expect("login sets a session cookie")
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let app = test_app();
    let req = Request::builder().uri("/tasks").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Not authenticated"));
}

#[tokio::test]
async fn wrong_password_does_not_open_a_session() {
    let app = test_app();
    register_and_login(&app, "ana").await;
    let (status, _, _) = send(&app.router, form("/login", "username=ana&password=bad")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_lifecycle_over_http() {
    let app = test_app();
    let cookie = register_and_login(&app, "ana").await;

    let (status, _, created) = send(
        &app.router,
        multipart_task(&cookie, TASK_FIELDS, Some(">p1\nMKTAYIAKQRQISFVKSH\n")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "Queued");
    assert_eq!(created["action"], "PREDICT");
    let id = created["id"].as_i64().unwrap();

    let queued = app.jobs.lock().await.try_recv().expect("job was queued");
    assert_eq!(queued.task_id, id);

    let (status, _, listed) = send(&app.router, get("/tasks", &cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (_, _, completed) = send(&app.router, get("/tasks?status=Completed", &cookie)).await;
    assert!(completed.as_array().unwrap().is_empty());

    let (status, _, fetched) = send(&app.router, get(&format!("/tasks/{id}"), &cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, _, _) = send(&app.router, delete(&format!("/tasks/{id}"), &cookie)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app.router, get(&format!("/tasks/{id}"), &cookie)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_submissions_are_bad_requests() {
    let app = test_app();
    let cookie = register_and_login(&app, "ana").await;

    let (status, _, _) = send(&app.router, multipart_task(&cookie, TASK_FIELDS, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut inverted = TASK_FIELDS.to_vec();
    inverted[3] = ("bepipred_min", "0.99");
    let (status, _, _) = send(
        &app.router,
        multipart_task(&cookie, &inverted, Some(">p1\nMKT\n")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, listed) = send(&app.router, get("/tasks", &cookie)).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn other_users_tasks_are_hidden_but_admins_see_all() {
    let app = test_app();
    let ana = register_and_login(&app, "ana").await;
    let bob = register_and_login(&app, "bob").await;

    let (_, _, created) = send(
        &app.router,
        multipart_task(&ana, TASK_FIELDS, Some(">p1\nMKTAYIAKQR\n")),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, _, _) = send(&app.router, get(&format!("/tasks/{id}"), &bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app.router, delete(&format!("/tasks/{id}"), &bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app.router, get("/admin/tasks", &bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins are provisioned directly, never through /register.
    let hash = bcrypt::hash("pw", 4).unwrap();
    app.store
        .save_user(User {
            id: None,
            name: "Root".into(),
            username: "root".into(),
            password_hash: hash,
            role: Role::Admin,
        })
        .await
        .unwrap();
    let root = login(&app, "root").await;

    let (status, _, all) = send(&app.router, get("/admin/tasks", &root)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
    let (status, _, _) = send(&app.router, delete(&format!("/tasks/{id}"), &root)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_role_cannot_be_self_registered() {
    let app = test_app();
    let (status, _, _) = send(
        &app.router,
        form(
            "/register",
            "name=Mallory&username=mallory&password=pw&confirm_password=pw&role=ADMIN",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
