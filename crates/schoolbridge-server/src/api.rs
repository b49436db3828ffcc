use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use schoolbridge_shared::session::SessionSigner;
use schoolbridge_store::Database;

use crate::config::ServerConfig;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::routes::{assignments, auth, dashboard, meetings, messages, students, users};

#[derive(Clone)]
pub struct AppState {
    /// The store connection. Handlers hold the lock only for synchronous
    /// store calls, never across an await.
    pub db: Arc<Mutex<Database>>,
    pub sessions: Arc<SessionSigner>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        let sessions = SessionSigner::from_secret(
            config.token_secret.as_bytes(),
            chrono::Duration::hours(config.token_ttl_hours),
        );
        let (limit, window) = config.rate_limit();
        Self {
            db: Arc::new(Mutex::new(db)),
            sessions: Arc::new(sessions),
            rate_limiter: RateLimiter::new(limit, window).trusting_proxy(config.trust_proxy),
            config: Arc::new(config),
        }
    }
}

/// Every API route, relative to its mount point.
fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/students", get(students::list).post(students::create))
        .route("/students/:id", get(students::get_one).delete(students::remove))
        .route("/students/:id/notes", post(students::add_note))
        .route("/assignments", get(assignments::list).post(assignments::create))
        .route("/assignments/:id", delete(assignments::remove))
        .route(
            "/assignments/:id/grade",
            post(assignments::grade).patch(assignments::grade),
        )
        .route("/meetings", get(meetings::list).post(meetings::create))
        .route("/meetings/:id", delete(meetings::remove))
        .route("/meetings/:id/status", patch(meetings::update_status))
        .route("/messages", get(messages::list))
        .route("/messages/send", post(messages::send))
        .route("/messages/:id/clear", delete(messages::clear))
        .route("/users/by-email/:email", get(users::by_email))
        .route("/dashboard", get(dashboard::summary))
}

/// The API is served both at the root and under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = routes();

    Router::new()
        .route("/", get(health_check))
        .merge(api.clone())
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.client_url == "*" {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(&config.client_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            warn!(value = %config.client_url, "Invalid CLIENT_URL, allowing the default origin");
            cors.allow_origin(HeaderValue::from_static("http://localhost:5173"))
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(state, listener).await
}

/// Serve on an already-bound listener, e.g. one on an ephemeral port.
pub async fn serve_listener(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP API server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use schoolbridge_shared::Role;

    use crate::config::ServerConfig;
    use crate::test_support::{student, TestApp};

    fn ids(list: &Value) -> Vec<String> {
        list.as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect()
    }

    async fn create_student(app: &TestApp, token: &str, body: Value) -> Value {
        let (status, created) = app.send(Method::POST, "/students", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        created
    }

    #[tokio::test]
    async fn health_is_served_at_root_and_under_api() {
        let app = TestApp::new();
        for uri in ["/", "/health", "/api/health"] {
            let (status, body) = app.send(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["ok"], true);
        }
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/students", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = app.send(Method::GET, "/api/students", Some("not.a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let app = TestApp::new();
        let (_, admin) = app.user(Role::Admin, "head@school.org", "admin123").await;
        let body = json!({"name": "Ms. Sharma", "email": " Sharma@School.org ", "password": "teacher123", "role": "teacher"});
        let (status, registered) = app
            .send(Method::POST, "/auth/register", Some(admin.as_str()), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(registered["user"]["email"], "sharma@school.org");
        assert!(registered["user"].get("passwordHash").is_none());

        let (status, _) = app
            .send(Method::POST, "/auth/register", Some(admin.as_str()), Some(body))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "sharma@school.org", "password": "wrong-one"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "SHARMA@school.org", "password": "teacher123"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = login["token"].as_str().unwrap();

        let (status, me) = app.send(Method::GET, "/auth/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "teacher");
        assert_eq!(me["name"], "Ms. Sharma");
    }

    #[tokio::test]
    async fn staff_accounts_cannot_self_register() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;

        for role in ["teacher", "admin"] {
            let body = json!({"name": "Mallory", "email": format!("{role}@evil.org"), "password": "hunter22", "role": role});
            let (status, error) = app.send(Method::POST, "/auth/register", None, Some(body.clone())).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(error["error"].as_str().unwrap().contains("admin"));

            let (status, _) = app
                .send(Method::POST, "/auth/register", Some(teacher.as_str()), Some(body))
                .await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }

        let (status, _) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "teacher@evil.org", "password": "hunter22"})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"name": "Kid", "email": "kid@x.com", "password": "student1", "role": "student"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "student");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let token = Some(teacher.as_str());

        let (status, body) = app.send(Method::GET, "/students/not-a-uuid", token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"), "{body}");

        let (status, body) = app
            .send(
                Method::POST,
                "/meetings",
                token,
                Some(json!({"studentId": "x", "startsAt": "2026-11-02T15:30", "durationMinutes": -5})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let (status, body) = app.send(Method::GET, "/api/assignments?studentId=nope", token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");

        let (status, body) = app.send(Method::POST, "/auth/login", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn registration_defaults_to_parent_and_checks_password_length() {
        let app = TestApp::new();
        let (status, _) = app
            .send(Method::POST, "/auth/register", None, Some(json!({"name": "P", "email": "p@x.com", "password": "123"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(Method::POST, "/auth/register", None, Some(json!({"name": "P", "email": "p@x.com", "password": "123456"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["role"], "parent");
    }

    #[tokio::test]
    async fn parent_created_with_student_can_log_in_and_sees_only_their_child() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;

        let aarav = create_student(
            &app,
            &teacher,
            json!({"firstName": "Aarav", "lastName": "K", "className": "7A",
                   "parentName": "Priya K", "parentEmail": "p@x.com", "parentPassword": "P-ABC1234"}),
        )
        .await;
        assert_eq!(aarav["parentPassword"], "P-ABC1234");
        assert_eq!(aarav["guardians"].as_array().unwrap().len(), 1);
        create_student(&app, &teacher, json!({"firstName": "Maya", "className": "7A"})).await;

        let (status, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "P-ABC1234"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login["user"]["role"], "parent");
        let parent = login["token"].as_str().unwrap();

        let (status, mine) = app.send(Method::GET, "/students", Some(parent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&mine), vec![aarav["id"].as_str().unwrap().to_string()]);

        let (_, all) = app.send(Method::GET, "/students", Some(teacher.as_str()), None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn parent_password_is_stored_verbatim() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;

        let created = create_student(
            &app,
            &teacher,
            json!({"firstName": "Aarav", "parentEmail": "p@x.com", "parentPassword": " P-ABC1234 "}),
        )
        .await;
        assert_eq!(created["parentPassword"], " P-ABC1234 ");

        let (status, _) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": " P-ABC1234 "})))
            .await;
        assert_eq!(status, StatusCode::OK);

        let blank = create_student(
            &app,
            &teacher,
            json!({"firstName": "Maya", "parentEmail": "q@x.com", "parentPassword": "   "}),
        )
        .await;
        assert!(blank["parentPassword"].as_str().unwrap().starts_with("P-"));
    }

    #[tokio::test]
    async fn re_adding_a_parent_resyncs_the_password() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;

        let first = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com"})).await;
        let generated = first["parentPassword"].as_str().unwrap();
        assert!(generated.starts_with("P-"));
        assert_eq!(generated.len(), 9);

        let second = create_student(
            &app,
            &teacher,
            json!({"firstName": "Ira", "parentEmail": "P@X.com", "parentPassword": "P-NEWPASS"}),
        )
        .await;
        assert_eq!(first["guardians"], second["guardians"]);

        let (status, _) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": generated})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "P-NEWPASS"})))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, mine) = app
            .send(Method::GET, "/students", login["token"].as_str(), None)
            .await;
        assert_eq!(mine.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn student_creation_is_staff_only_and_guards_other_roles_emails() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let (_, parent) = app.user(Role::Parent, "p@x.com", "parent123").await;

        let (status, _) = app
            .send(Method::POST, "/students", Some(parent.as_str()), Some(json!({"firstName": "Aarav"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(Method::POST, "/students", Some(teacher.as_str()), Some(json!({"firstName": "  "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(
                Method::POST,
                "/students",
                Some(teacher.as_str()),
                Some(json!({"firstName": "Aarav", "parentEmail": "t@school.org"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, all) = app.send(Method::GET, "/students", Some(teacher.as_str()), None).await;
        assert!(all.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn student_detail_hides_other_families() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let (_, stranger) = app.user(Role::Parent, "other@x.com", "parent123").await;
        let (_, pupil) = app.user(Role::Student, "kid@x.com", "student123").await;

        let aarav = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com"})).await;
        let uri = format!("/students/{}", aarav["id"].as_str().unwrap());

        let (status, _) = app.send(Method::GET, &uri, Some(teacher.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.send(Method::GET, &uri, Some(stranger.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.send(Method::GET, "/students", Some(pupil.as_str()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn listing_heals_students_missing_a_guardian() {
        let app = TestApp::new();
        let mut orphan = student("Aarav", "7A");
        orphan.parent_email = Some("p@x.com".into());
        app.state.db.lock().await.insert_student(&orphan).unwrap();

        let (_, parent) = app.user(Role::Parent, "p@x.com", "parent123").await;
        let (_, mine) = app.send(Method::GET, "/students", Some(parent.as_str()), None).await;
        assert_eq!(ids(&mine), vec![orphan.id.to_string()]);
    }

    #[tokio::test]
    async fn student_filters_and_behaviour_notes() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let (_, parent) = app.user(Role::Parent, "p@x.com", "parent123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav", "className": "7A"})).await;
        create_student(&app, &teacher, json!({"firstName": "Maya", "className": "8B"})).await;

        let notes_uri = format!("/students/{}/notes", a["id"].as_str().unwrap());
        let (status, _) = app
            .send(Method::POST, &notes_uri, Some(parent.as_str()), Some(json!({"note": "Great focus"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, updated) = app
            .send(Method::POST, &notes_uri, Some(teacher.as_str()), Some(json!({"note": "Great focus", "tag": "praise"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(updated["behaviourNotes"][0]["tag"], "praise");

        let (_, in_7a) = app.send(Method::GET, "/students?className=7A", Some(teacher.as_str()), None).await;
        assert_eq!(ids(&in_7a), vec![a["id"].as_str().unwrap().to_string()]);
        let (_, praised) = app.send(Method::GET, "/students?behaviourTag=praise", Some(teacher.as_str()), None).await;
        assert_eq!(praised.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn assignment_fans_out_progress_to_each_target() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav"})).await;
        let m = create_student(&app, &teacher, json!({"firstName": "Maya"})).await;

        let (status, created) = app
            .send(
                Method::POST,
                "/assignments",
                Some(teacher.as_str()),
                Some(json!({"title": "Math Test 1", "subject": "Math", "assignedTo": [a["id"], m["id"], a["id"]]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["maxMarks"], 100.0);
        assert_eq!(created["assignedTo"].as_array().unwrap().len(), 2);
        assert_eq!(created["failedStudents"], json!([]));

        for s in [&a, &m] {
            let (_, loaded) = app
                .send(Method::GET, &format!("/students/{}", s["id"].as_str().unwrap()), Some(teacher.as_str()), None)
                .await;
            let progress = loaded["assignmentProgress"].as_array().unwrap();
            assert_eq!(progress.len(), 1);
            assert_eq!(progress[0]["status"], "assigned");
            assert_eq!(progress[0]["assignment"], created["id"]);
        }
    }

    #[tokio::test]
    async fn assignment_to_all_and_unknown_targets() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        create_student(&app, &teacher, json!({"firstName": "Aarav"})).await;
        create_student(&app, &teacher, json!({"firstName": "Maya"})).await;

        let (status, _) = app
            .send(
                Method::POST,
                "/assignments",
                Some(teacher.as_str()),
                Some(json!({"title": "Ghost", "assignedTo": [uuid::Uuid::new_v4()]})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Zero", "maxMarks": 0})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, listed) = app.send(Method::GET, "/assignments", Some(teacher.as_str()), None).await;
        assert!(listed.as_array().unwrap().is_empty());

        let (status, created) = app
            .send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Essay", "assignedTo": "all"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["assignedTo"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn grading_validates_before_writing() {
        let app = TestApp::new();
        let (teacher_user, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav"})).await;
        let outsider = create_student(&app, &teacher, json!({"firstName": "Maya"})).await;
        let (_, created) = app
            .send(
                Method::POST,
                "/assignments",
                Some(teacher.as_str()),
                Some(json!({"title": "Math Test 1", "maxMarks": 50, "assignedTo": [a["id"]]})),
            )
            .await;
        let grade_uri = format!("/assignments/{}/grade", created["id"].as_str().unwrap());
        let student_uri = format!("/students/{}", a["id"].as_str().unwrap());

        for bad in [
            json!({"grades": [{"studentId": a["id"], "score": 51}]}),
            json!({"grades": [{"studentId": a["id"], "score": -1}]}),
            json!({"grades": [{"studentId": a["id"], "score": 40}, {"studentId": outsider["id"], "score": 10}]}),
        ] {
            let (status, _) = app.send(Method::POST, &grade_uri, Some(teacher.as_str()), Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (_, untouched) = app.send(Method::GET, &student_uri, Some(teacher.as_str()), None).await;
        assert_eq!(untouched["assignmentProgress"][0]["status"], "assigned");
        assert!(untouched["assignmentProgress"][0]["marks"].is_null());

        let (status, graded) = app
            .send(
                Method::POST,
                &grade_uri,
                Some(teacher.as_str()),
                Some(json!({"grades": [{"studentId": a["id"], "score": 42, "remarks": "Good work"}]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graded["grades"][0]["score"], 42.0);

        let (_, regraded) = app
            .send(Method::PATCH, &grade_uri, Some(teacher.as_str()), Some(json!({"studentId": a["id"], "score": 45})))
            .await;
        assert_eq!(regraded["grades"].as_array().unwrap().len(), 1);

        let (_, loaded) = app.send(Method::GET, &student_uri, Some(teacher.as_str()), None).await;
        let progress = &loaded["assignmentProgress"][0];
        assert_eq!(progress["status"], "completed");
        assert_eq!(progress["marks"], 45.0);
        assert_eq!(progress["gradedBy"], teacher_user.id.to_string());
    }

    #[tokio::test]
    async fn deleting_an_assignment_unlinks_students() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav"})).await;
        let (_, created) = app
            .send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Math Test 1", "assignedTo": "all"})))
            .await;
        let uri = format!("/assignments/{}", created["id"].as_str().unwrap());

        let (status, deleted) = app.send(Method::DELETE, &uri, Some(teacher.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["cleanup"]["studentsUpdated"], 1);

        let (_, loaded) = app
            .send(Method::GET, &format!("/students/{}", a["id"].as_str().unwrap()), Some(teacher.as_str()), None)
            .await;
        assert_eq!(loaded["assignments"], json!([]));
        assert_eq!(loaded["assignmentProgress"], json!([]));

        let (status, _) = app.send(Method::DELETE, &uri, Some(teacher.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn parents_see_only_their_childrens_assignments() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com", "parentPassword": "parent123"})).await;
        let m = create_student(&app, &teacher, json!({"firstName": "Maya"})).await;
        app.send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Mine", "assignedTo": [a["id"]]})))
            .await;
        app.send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Theirs", "assignedTo": [m["id"]]})))
            .await;

        let (_, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "parent123"})))
            .await;
        let parent = login["token"].as_str().unwrap();

        let (_, mine) = app.send(Method::GET, "/assignments", Some(parent), None).await;
        let titles: Vec<&str> = mine.as_array().unwrap().iter().map(|a| a["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Mine"]);

        let (_, narrowed) = app
            .send(Method::GET, &format!("/assignments?studentId={}", m["id"].as_str().unwrap()), Some(parent), None)
            .await;
        assert!(narrowed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn meeting_lifecycle() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let (_, stranger) = app.user(Role::Parent, "other@x.com", "parent123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com", "parentPassword": "parent123"})).await;

        let (status, _) = app
            .send(
                Method::POST,
                "/meetings",
                Some(teacher.as_str()),
                Some(json!({"studentId": a["id"], "title": "Too long", "startsAt": "2030-01-10T09:00", "durationMinutes": 500})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, later) = app
            .send(
                Method::POST,
                "/meetings",
                Some(teacher.as_str()),
                Some(json!({"studentId": a["id"], "title": "Term review", "startsAt": "2030-01-10T09:00"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(later["status"], "scheduled");
        assert_eq!(later["durationMinutes"], 30);
        assert_eq!(later["studentInfo"]["firstName"], "Aarav");

        let (_, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "parent123"})))
            .await;
        let parent = login["token"].as_str().unwrap();
        let (status, sooner) = app
            .send(
                Method::POST,
                "/meetings",
                Some(parent),
                Some(json!({"studentId": a["id"], "title": "Quick chat", "startsAt": "2030-01-05T16:30:00Z"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app
            .send(
                Method::POST,
                "/meetings",
                Some(stranger.as_str()),
                Some(json!({"studentId": a["id"], "title": "Nope", "startsAt": "2030-01-05T16:30"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listed) = app.send(Method::GET, "/meetings", Some(parent), None).await;
        assert_eq!(ids(&listed), vec![sooner["id"].as_str().unwrap().to_string(), later["id"].as_str().unwrap().to_string()]);
        let (_, none) = app.send(Method::GET, "/meetings", Some(stranger.as_str()), None).await;
        assert!(none.as_array().unwrap().is_empty());

        let status_uri = format!("/meetings/{}/status", later["id"].as_str().unwrap());
        let (status, _) = app
            .send(Method::PATCH, &status_uri, Some(teacher.as_str()), Some(json!({"status": "postponed"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .send(Method::PATCH, &status_uri, Some(stranger.as_str()), Some(json!({"status": "cancelled"})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, done) = app
            .send(Method::PATCH, &status_uri, Some(teacher.as_str()), Some(json!({"status": "completed"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], "completed");
        let (status, _) = app
            .send(Method::PATCH, &status_uri, Some(parent), Some(json!({"status": "cancelled"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // The parent may delete the meeting they booked, not the teacher's.
        let (status, _) = app
            .send(Method::DELETE, &format!("/meetings/{}", later["id"].as_str().unwrap()), Some(parent), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .send(Method::DELETE, &format!("/meetings/{}", sooner["id"].as_str().unwrap()), Some(parent), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn parent_message_reaches_teacher_tagged_as_parent() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let (_, stranger) = app.user(Role::Parent, "other@x.com", "parent123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com", "parentPassword": "parent123"})).await;
        let (_, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "parent123"})))
            .await;
        let parent = login["token"].as_str().unwrap();

        let (status, _) = app
            .send(Method::POST, "/messages/send", Some(parent), Some(json!({"studentId": a["id"], "text": "   "})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .send(Method::POST, "/messages/send", Some(stranger.as_str()), Some(json!({"studentId": a["id"], "text": "Hi"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, sent) = app
            .send(Method::POST, "/messages/send", Some(parent), Some(json!({"studentId": a["id"], "text": " Hello! "})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(sent["teacherName"].is_null());

        let (_, reply) = app
            .send(Method::POST, "/messages/send", Some(teacher.as_str()), Some(json!({"studentId": a["id"], "body": "Hi there"})))
            .await;
        assert_eq!(reply["id"], sent["id"]);
        assert_eq!(reply["teacherName"], "teacher t@school.org");

        let (_, threads) = app.send(Method::GET, "/messages", Some(teacher.as_str()), None).await;
        let threads = threads.as_array().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0]["messages"][0]["senderRole"], "parent");
        assert_eq!(threads[0]["messages"][0]["text"], "Hello!");
        assert_eq!(threads[0]["messages"][1]["senderRole"], "teacher");
        assert_eq!(threads[0]["studentInfo"]["firstName"], "Aarav");

        let (_, theirs) = app.send(Method::GET, "/messages", Some(stranger.as_str()), None).await;
        assert!(theirs.as_array().unwrap().is_empty());

        let clear_uri = format!("/messages/{}/clear", sent["id"].as_str().unwrap());
        let (status, _) = app.send(Method::DELETE, &clear_uri, Some(stranger.as_str()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, cleared) = app.send(Method::DELETE, &clear_uri, Some(parent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["messages"], json!([]));
    }

    #[tokio::test]
    async fn deleting_a_student_cleans_up_and_reports() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav"})).await;
        let (_, assignment) = app
            .send(Method::POST, "/assignments", Some(teacher.as_str()), Some(json!({"title": "Math Test 1", "assignedTo": [a["id"]]})))
            .await;
        app.send(
            Method::POST,
            "/meetings",
            Some(teacher.as_str()),
            Some(json!({"studentId": a["id"], "title": "Review", "startsAt": "2030-01-10T09:00"})),
        )
        .await;
        app.send(Method::POST, "/messages/send", Some(teacher.as_str()), Some(json!({"studentId": a["id"], "text": "Hello"})))
            .await;

        let uri = format!("/students/{}", a["id"].as_str().unwrap());
        let (status, _) = app.send(Method::DELETE, &uri, Some(teacher.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, deleted) = app.send(Method::DELETE, &uri, Some(teacher.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{deleted}");

        let (_, assignments) = app.send(Method::GET, "/assignments", Some(teacher.as_str()), None).await;
        assert_eq!(assignments[0]["id"], assignment["id"]);
        assert_eq!(assignments[0]["assignedTo"], json!([]));
        let (_, meetings) = app.send(Method::GET, "/meetings", Some(teacher.as_str()), None).await;
        assert!(meetings.as_array().unwrap().is_empty());
        let (_, threads) = app.send(Method::GET, "/messages", Some(teacher.as_str()), None).await;
        assert!(threads.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dashboard_counts_follow_scope() {
        let app = TestApp::new();
        let (_, teacher) = app.user(Role::Teacher, "t@school.org", "teacher123").await;
        let a = create_student(&app, &teacher, json!({"firstName": "Aarav", "parentEmail": "p@x.com", "parentPassword": "parent123"})).await;
        create_student(&app, &teacher, json!({"firstName": "Maya"})).await;
        app.send(
            Method::POST,
            "/meetings",
            Some(teacher.as_str()),
            Some(json!({"studentId": a["id"], "title": "Review", "startsAt": "2030-01-10T09:00"})),
        )
        .await;

        let (_, staff) = app.send(Method::GET, "/dashboard", Some(teacher.as_str()), None).await;
        assert_eq!(staff["students"], 2);
        assert_eq!(staff["upcomingMeetings"], 1);

        let (_, login) = app
            .send(Method::POST, "/auth/login", None, Some(json!({"email": "p@x.com", "password": "parent123"})))
            .await;
        let (_, family) = app.send(Method::GET, "/api/dashboard", login["token"].as_str(), None).await;
        assert_eq!(family["role"], "parent");
        assert_eq!(family["students"], 1);
        assert_eq!(family["threads"], 0);
    }

    #[tokio::test]
    async fn user_lookup_by_email() {
        let app = TestApp::new();
        let (parent, token) = app.user(Role::Parent, "p@x.com", "parent123").await;

        let (status, found) = app.send(Method::GET, "/users/by-email/P@x.com", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], parent.id.to_string());

        let (status, _) = app.send(Method::GET, "/users/by-email/nobody@x.com", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_client() {
        let app = TestApp::with_config(ServerConfig {
            rate_limit_per_window: 2,
            rate_limit_window_secs: 3600,
            trust_proxy: true,
            ..ServerConfig::default()
        });
        let request = |ip: &str| {
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let resp = app.router.clone().oneshot(request("203.0.113.9")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
        let resp = app.router.clone().oneshot(request("203.0.113.9")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("retry-after"));

        let resp = app.router.clone().oneshot(request("203.0.113.10")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_header_is_ignored_without_a_trusted_proxy() {
        let app = TestApp::with_config(ServerConfig {
            rate_limit_per_window: 1,
            rate_limit_window_secs: 3600,
            ..ServerConfig::default()
        });
        for _ in 0..3 {
            let request = Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap();
            let resp = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn tokens_and_records_survive_a_restart_on_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");
        let config = || ServerConfig {
            token_secret: "restart-secret".into(),
            database_path: Some(path.clone()),
            ..ServerConfig::default()
        };
        let open = |config: ServerConfig| {
            let db = schoolbridge_store::Database::open_at(&path).unwrap();
            super::build_router(super::AppState::new(db, config))
        };

        {
            let db = schoolbridge_store::Database::open_at(&path).unwrap();
            db.create_user(&schoolbridge_shared::User {
                id: uuid::Uuid::new_v4(),
                name: "Ms. Sharma".into(),
                email: "t@school.org".into(),
                password_hash: schoolbridge_shared::password::hash_password("teacher123").unwrap(),
                role: Role::Teacher,
                created_at: chrono::Utc::now(),
            })
            .unwrap();
        }

        let first = open(config());
        let (status, login) = call(
            &first,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "t@school.org", "password": "teacher123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = login["token"].as_str().unwrap().to_string();
        call(&first, Method::POST, "/students", Some(token.as_str()), Some(json!({"firstName": "Aarav"}))).await;
        drop(first);

        let second = open(config());
        let (status, students) = call(&second, Method::GET, "/students", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(students[0]["firstName"], "Aarav");
    }

    async fn call(
        router: &axum::Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
        let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
