//! Router assembly and the listening loop.

use crate::{
    api::{AppState, routes},
    errors::Result,
};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Origins accepted when `CORS_PERMISSIVE` is off (the frontend dev servers)
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

fn cors_layer(permissive: bool) -> CorsLayer {
    if permissive {
        return CorsLayer::permissive();
    }
    let origins = LOCAL_ORIGINS.map(HeaderValue::from_static);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(crate::api::auth::RUNNER_TOKEN_HEADER),
        ])
}

/// Create the Axum router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(state.config.cors_permissive));

    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/password", post(routes::auth::change_password))
        // Users
        .route("/api/users", get(routes::users::list_users))
        .route("/api/users/{id}", get(routes::users::get_user))
        .route("/api/users/{id}/approve", post(routes::users::approve_user))
        .route("/api/users/{id}/reject", post(routes::users::reject_user))
        .route("/api/users/{id}/disable", post(routes::users::disable_user))
        .route(
            "/api/users/{id}/reset-password",
            post(routes::users::reset_password),
        )
        .route("/api/users/{id}/role", put(routes::users::set_role))
        .route(
            "/api/users/{id}/affiliation",
            put(routes::users::set_affiliation),
        )
        // Reference data
        .route("/api/roles", get(routes::organization::list_roles))
        .route(
            "/api/directorates",
            get(routes::organization::list_directorates)
                .post(routes::organization::create_directorate),
        )
        .route(
            "/api/entitas",
            get(routes::organization::list_entitas).post(routes::organization::create_entitas),
        )
        .route(
            "/api/entitas/{id}",
            put(routes::organization::update_entitas),
        )
        .route(
            "/api/mkt-companies",
            get(routes::organization::list_mkt_companies)
                .post(routes::organization::create_mkt_company),
        )
        .route(
            "/api/mkt-companies/{id}",
            put(routes::organization::update_mkt_company),
        )
        // Loans
        .route(
            "/api/loans",
            get(routes::loans::list_loans).post(routes::loans::submit_loan),
        )
        .route("/api/loans/{id}", get(routes::loans::get_loan))
        .route(
            "/api/loans/{id}/approvals",
            post(routes::loans::decide_approval),
        )
        .route(
            "/api/loans/{id}/warehouse",
            put(routes::loans::update_warehouse),
        )
        .route(
            "/api/loans/{id}/return-request",
            post(routes::loans::request_return),
        )
        .route(
            "/api/loans/{id}/return-request/decision",
            post(routes::loans::decide_return),
        )
        .route("/api/loans/{id}/cancel", post(routes::loans::cancel_loan))
        // Admin
        .route(
            "/api/admin/mail-settings",
            get(routes::admin::get_mail_settings).put(routes::admin::update_mail_settings),
        )
        .route(
            "/api/admin/appscript-config",
            get(routes::admin::get_appscript_config).put(routes::admin::update_appscript_config),
        )
        .route("/api/admin/audit-logs", get(routes::admin::list_audit_logs))
        // Reminders
        .route(
            "/api/reminders/status",
            get(routes::reminders::reminder_status),
        )
        .route("/api/reminders/due", get(routes::reminders::due_loans))
        .route("/api/reminders/runs", post(routes::reminders::record_run))
        .route(
            "/api/reminders/runs/start",
            post(routes::reminders::start_run),
        )
        .route(
            "/api/reminders/runs/{id}/finish",
            post(routes::reminders::finish_run),
        )
        .with_state(state)
        .layer(middleware)
}

/// Binds `BIND_ADDR` and serves until Ctrl+C or SIGTERM.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr;
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("FormFlow listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        config::AppConfig,
        core::{
            auth::{ROLE_ADMIN, ROLE_USER},
            settings::{self, AppscriptConfigUpdate},
        },
        test_utils::{
            TEST_PASSWORD, create_test_company, create_test_entitas, create_test_loan,
            create_test_user, setup_test_db,
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";
    const RUNNER_TOKEN: &str = "runner-token";

    async fn test_state(config: AppConfig) -> Result<Arc<AppState>> {
        let db = setup_test_db().await?;
        let config = AppConfig {
            auth_secret: Some(SECRET.to_string()),
            ..config
        };
        Ok(Arc::new(AppState::new(db, config)?))
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login_token(app: &Router, username: &str) -> String {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "identifier": username, "password": TEST_PASSWORD })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health_endpoint() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let app = build_router(state);

        let response = app.oneshot(request("GET", "/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_login_then_me() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        create_test_user(&state.db, "alice", ROLE_ADMIN).await?;
        let app = build_router(state);

        let token = login_token(&app, "alice").await;
        let response = app
            .oneshot(request("GET", "/api/auth/me", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["role"], ROLE_ADMIN);
        Ok(())
    }

    #[tokio::test]
    async fn test_login_failures_are_distinguished() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        create_test_user(&state.db, "alice", ROLE_USER).await?;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "identifier": "alice", "password": "wrong-password" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "INVALID_PASSWORD");

        let response = app
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "identifier": "nobody", "password": TEST_PASSWORD })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "USER_NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_401() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/loans", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/api/loans", Some("not-a-token"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "UNAUTHORIZED");
        Ok(())
    }

    #[tokio::test]
    async fn test_register_creates_pending_account() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let app = build_router(state);

        let response = app
            .oneshot(request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "username": "newbie",
                    "email": "newbie@example.com",
                    "full_name": "New Bie",
                    "password": "long-enough",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        assert!(body.get("password_hash").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_register_disabled_is_403() -> Result<()> {
        let state = test_state(AppConfig {
            registration_enabled: false,
            ..AppConfig::default()
        })
        .await?;
        let app = build_router(state);

        let response = app
            .oneshot(request(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "username": "newbie",
                    "email": "newbie@example.com",
                    "full_name": "New Bie",
                    "password": "long-enough",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_routes_reject_plain_users() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        create_test_user(&state.db, "bob", ROLE_USER).await?;
        let app = build_router(state);

        let token = login_token(&app, "bob").await;
        let response = app
            .oneshot(request("GET", "/api/users", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_workflow_routes_require_company_role() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let bob = create_test_user(&state.db, "bob", ROLE_USER).await?;
        let company = create_test_company(&state.db, "MKT-A").await?;
        let entitas = create_test_entitas(&state.db, "ENT-A").await?;
        let loan_id = create_test_loan(&state.db, bob.id, entitas.id, &[company.id]).await?;
        let app = build_router(state);

        // The borrower holds neither the approver nor the warehouse role
        let bob_token = login_token(&app, "bob").await;
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/loans/{loan_id}/approvals"),
                Some(&bob_token),
                Some(json!({ "company_code": "MKT-A", "decision": "approve" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(request(
                "PUT",
                &format!("/api/loans/{loan_id}/warehouse"),
                Some(&bob_token),
                Some(json!({ "company_code": "MKT-A", "stage": "prepared" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request(
                "POST",
                &format!("/api/loans/{loan_id}/return-request/decision"),
                Some(&bob_token),
                Some(json!({ "approve": true })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_other_users_loan_is_hidden() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let bob = create_test_user(&state.db, "bob", ROLE_USER).await?;
        create_test_user(&state.db, "carol", ROLE_USER).await?;
        let company = create_test_company(&state.db, "MKT-A").await?;
        let entitas = create_test_entitas(&state.db, "ENT-A").await?;
        let loan_id = create_test_loan(&state.db, bob.id, entitas.id, &[company.id]).await?;
        let app = build_router(state);

        let uri = format!("/api/loans/{loan_id}");
        let bob_token = login_token(&app, "bob").await;
        let response = app
            .clone()
            .oneshot(request("GET", &uri, Some(&bob_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["loan"]["status"], "pending");

        let carol_token = login_token(&app, "carol").await;
        let response = app
            .clone()
            .oneshot(request("GET", &uri, Some(&carol_token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("GET", "/api/loans", Some(&carol_token), None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_and_approve_loan() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        create_test_user(&state.db, "admin", ROLE_ADMIN).await?;
        create_test_user(&state.db, "bob", ROLE_USER).await?;
        let company = create_test_company(&state.db, "MKT-A").await?;
        let entitas = create_test_entitas(&state.db, "ENT-A").await?;
        let app = build_router(state);

        let bob_token = login_token(&app, "bob").await;
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/loans",
                Some(&bob_token),
                Some(json!({
                    "entitas_id": entitas.id,
                    "purpose": "Expo booth",
                    "start_date": "2026-05-01",
                    "end_date": "2026-05-03",
                    "mkt_company_ids": [company.id],
                    "needs": [{ "name": "Tent", "quantity": 1 }],
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let loan_id = json_body(response).await["loan"]["id"].as_i64().unwrap();

        let admin_token = login_token(&app, "admin").await;
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/loans/{loan_id}/approvals"),
                Some(&admin_token),
                Some(json!({ "company_code": "MKT-A", "decision": "approve" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["loan"]["status"], "approved");

        // Bob cannot cancel once approved
        let response = app
            .oneshot(request(
                "POST",
                &format!("/api/loans/{loan_id}/cancel"),
                Some(&bob_token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "INVALID_TRANSITION");
        Ok(())
    }

    #[tokio::test]
    async fn test_mail_settings_mask_password() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        create_test_user(&state.db, "admin", ROLE_ADMIN).await?;
        let app = build_router(state);

        let token = login_token(&app, "admin").await;
        let response = app
            .oneshot(request(
                "PUT",
                "/api/admin/mail-settings",
                Some(&token),
                Some(json!({
                    "smtp_host": "smtp.example.com",
                    "smtp_port": 587,
                    "smtp_user": "mailer",
                    "smtp_password": "hunter22",
                    "from_address": "noreply@example.com",
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["has_password"], true);
        assert!(body.get("smtp_password").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_runner_reports_with_token() -> Result<()> {
        let state = test_state(AppConfig::default()).await?;
        let admin = create_test_user(&state.db, "admin", ROLE_ADMIN).await?;
        settings::update_appscript_config(
            &state.db,
            admin.id,
            AppscriptConfigUpdate {
                script_url: "https://script.google.com/macros/s/abc/exec".to_string(),
                secret_token: Some(RUNNER_TOKEN.to_string()),
                enabled: true,
                reminder_days_before: 2,
            },
        )
        .await?;
        let app = build_router(state);
        let report = json!({ "kind": "overdue", "sent_count": 3 });

        let response = app
            .clone()
            .oneshot(request("POST", "/api/reminders/runs", None, Some(report.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut authed = request("POST", "/api/reminders/runs", None, Some(report));
        authed.headers_mut().insert(
            crate::api::auth::RUNNER_TOKEN_HEADER,
            HeaderValue::from_static(RUNNER_TOKEN),
        );
        let response = app.clone().oneshot(authed).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["sent_count"], 3);

        let mut due = request("GET", "/api/reminders/due", None, None);
        due.headers_mut().insert(
            crate::api::auth::RUNNER_TOKEN_HEADER,
            HeaderValue::from_static(RUNNER_TOKEN),
        );
        let response = app.oneshot(due).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));
        Ok(())
    }
}
