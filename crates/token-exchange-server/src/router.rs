//! Token exchange HTTP routes.

use crate::credential::extract_credentials;
use crate::error::{ExchangeError, ExchangeResult};
use crate::minter::{BackendTokenMinter, HttpBackendTokenMinter, MintRequest};
use crate::verifier::{HttpIdpVerifier, IdpSessionVerifier, VerifiedIdentity};
use authbridge_config_and_utils::Config;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state for the exchange routes.
#[derive(Clone)]
pub struct ExchangeState {
    pub verifier: Arc<dyn IdpSessionVerifier>,
    pub minter: Arc<dyn BackendTokenMinter>,
    pub session_cookie: String,
}

impl ExchangeState {
    pub fn new(
        verifier: Arc<dyn IdpSessionVerifier>,
        minter: Arc<dyn BackendTokenMinter>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            minter,
            session_cookie: session_cookie.into(),
        }
    }

    /// Build the HTTP verifier and minter from configuration. Requires the
    /// DataBackend admin token.
    pub fn from_config(config: &Config) -> ExchangeResult<Self> {
        let admin_token = config.backend_admin_token.clone().ok_or_else(|| {
            ExchangeError::Config(format!(
                "{} is not set",
                authbridge_config_and_utils::BACKEND_ADMIN_TOKEN_ENV
            ))
        })?;
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let server = &config.server;

        let verifier = HttpIdpVerifier::new(&server.idp_url, &server.idp_session_cookie, timeout)?;
        let minter = HttpBackendTokenMinter::new(
            &server.backend_url,
            admin_token,
            server.backend_app_id.clone(),
            timeout,
        )?;

        Ok(Self::new(
            Arc::new(verifier),
            Arc::new(minter),
            server.idp_session_cookie.clone(),
        ))
    }
}

/// Build the router with the exchange endpoint mounted at `exchange_path`,
/// which must be an absolute route other than `/healthz`.
pub fn router(state: ExchangeState, exchange_path: &str) -> ExchangeResult<Router> {
    if !exchange_path.starts_with('/') || exchange_path == "/healthz" {
        return Err(ExchangeError::Config(format!(
            "invalid exchange path {:?}",
            exchange_path
        )));
    }
    Ok(Router::new()
        .route(exchange_path, post(exchange))
        .route("/healthz", get(healthz))
        .with_state(state))
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> ExchangeResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Token exchange server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Token exchange server stopped");
    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn normalize_user_id(id: &str) -> String {
    id.trim().to_lowercase()
}

async fn verify_any(state: &ExchangeState, headers: &HeaderMap) -> ExchangeResult<VerifiedIdentity> {
    for credential in extract_credentials(headers, &state.session_cookie) {
        if let Some(identity) = state.verifier.verify(&credential).await? {
            debug!(kind = credential.kind(), user_id = %identity.user_id, "IdP session verified");
            return Ok(identity);
        }
    }
    Err(ExchangeError::Unauthorized)
}

async fn exchange(
    State(state): State<ExchangeState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ExchangeError> {
    let identity = verify_any(&state, &headers).await?;

    let email = identity
        .primary_email
        .filter(|e| !e.trim().is_empty())
        .ok_or(ExchangeError::MissingField("primary_email"))?;

    let minted = state
        .minter
        .mint(&MintRequest {
            user_id: identity.user_id.clone(),
            email,
        })
        .await?;

    if normalize_user_id(&minted.user_id) != normalize_user_id(&identity.user_id) {
        return Err(ExchangeError::IdentityMismatch {
            idp_user: identity.user_id,
            minted_user: minted.user_id,
        });
    }

    info!(user_id = %identity.user_id, "Issued DataBackend token");
    Ok(Json(json!({ "token": minted.token })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::IdpCredential;
    use crate::minter::MintedToken;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const EXCHANGE_PATH: &str = "/api/auth/token-exchange";

    /// Accepts credentials listed in `sessions`; everything else is rejected.
    #[derive(Default)]
    struct FakeVerifier {
        sessions: HashMap<String, VerifiedIdentity>,
        fail: bool,
    }

    impl FakeVerifier {
        fn with(mut self, credential: &str, user_id: &str, email: Option<&str>) -> Self {
            self.sessions.insert(
                credential.to_string(),
                VerifiedIdentity {
                    user_id: user_id.to_string(),
                    primary_email: email.map(str::to_string),
                },
            );
            self
        }
    }

    #[async_trait]
    impl IdpSessionVerifier for FakeVerifier {
        async fn verify(&self, credential: &IdpCredential) -> ExchangeResult<Option<VerifiedIdentity>> {
            if self.fail {
                return Err(ExchangeError::Verification("IdP returned HTTP 503".to_string()));
            }
            let key = match credential {
                IdpCredential::Bearer(t) => format!("bearer:{}", t),
                IdpCredential::SessionCookie(c) => format!("cookie:{}", c),
            };
            Ok(self.sessions.get(&key).cloned())
        }
    }

    /// Mints `rt:<user>` tokens; `bound_to` overrides the reported user.
    #[derive(Default)]
    struct FakeMinter {
        bound_to: Option<String>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendTokenMinter for FakeMinter {
        async fn mint(&self, request: &MintRequest) -> ExchangeResult<MintedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExchangeError::Minting("admin API returned HTTP 500".to_string()));
            }
            Ok(MintedToken {
                token: format!("rt:{}", request.user_id),
                user_id: self.bound_to.clone().unwrap_or_else(|| request.user_id.clone()),
            })
        }
    }

    fn app(verifier: FakeVerifier, minter: Arc<FakeMinter>) -> Router {
        router(
            ExchangeState::new(Arc::new(verifier), minter, "stack-access"),
            EXCHANGE_PATH,
        )
        .unwrap()
    }

    async fn post_exchange(app: Router, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(EXCHANGE_PATH);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_cookie_session_issues_token() {
        let verifier = FakeVerifier::default().with("cookie:s1", "user-1", Some("one@example.com"));
        let (status, body) = post_exchange(
            app(verifier, Arc::new(FakeMinter::default())),
            &[("cookie", "stack-access=s1")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"token": "rt:user-1"}));
    }

    #[tokio::test]
    async fn test_bearer_session_issues_token() {
        let verifier = FakeVerifier::default().with("bearer:at", "user-2", Some("two@example.com"));
        let (status, body) = post_exchange(
            app(verifier, Arc::new(FakeMinter::default())),
            &[("authorization", "Bearer at")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"token": "rt:user-2"}));
    }

    #[tokio::test]
    async fn test_rejected_bearer_falls_back_to_cookie() {
        let verifier = FakeVerifier::default().with("cookie:s1", "user-1", Some("one@example.com"));
        let (status, body) = post_exchange(
            app(verifier, Arc::new(FakeMinter::default())),
            &[("authorization", "Bearer stale"), ("cookie", "stack-access=s1")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"token": "rt:user-1"}));
    }

    #[tokio::test]
    async fn test_no_session_is_401() {
        let minter = Arc::new(FakeMinter::default());
        let (status, body) = post_exchange(app(FakeVerifier::default(), minter.clone()), &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Unauthorized: No IdP session found"}));

        let (status, _) = post_exchange(
            app(FakeVerifier::default(), minter.clone()),
            &[("cookie", "stack-access=unknown")],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(minter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_email_is_500() {
        let verifier = FakeVerifier::default().with("bearer:at", "user-1", None);
        let minter = Arc::new(FakeMinter::default());
        let (status, body) =
            post_exchange(app(verifier, minter.clone()), &[("authorization", "Bearer at")]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({
                "error": "Verified identity is missing a required field",
                "details": "primary_email"
            })
        );
        assert_eq!(minter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_minting_failure_is_500() {
        let verifier = FakeVerifier::default().with("bearer:at", "user-1", Some("one@example.com"));
        let minter = Arc::new(FakeMinter {
            fail: true,
            ..Default::default()
        });
        let (status, body) =
            post_exchange(app(verifier, minter), &[("authorization", "Bearer at")]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to generate authentication token");
    }

    #[tokio::test]
    async fn test_minted_user_must_match_idp_user() {
        let verifier = FakeVerifier::default().with("bearer:at", "user-1", Some("one@example.com"));
        let minter = Arc::new(FakeMinter {
            bound_to: Some("user-9".to_string()),
            ..Default::default()
        });
        let (status, body) =
            post_exchange(app(verifier, minter), &[("authorization", "Bearer at")]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn test_user_id_parity_ignores_case_and_whitespace() {
        let verifier = FakeVerifier::default().with("bearer:at", "User-1", Some("one@example.com"));
        let minter = Arc::new(FakeMinter {
            bound_to: Some(" user-1 ".to_string()),
            ..Default::default()
        });
        let (status, _) =
            post_exchange(app(verifier, minter), &[("authorization", "Bearer at")]).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verification_outage_is_500() {
        let verifier = FakeVerifier {
            fail: true,
            ..Default::default()
        };
        let (status, _) = post_exchange(
            app(verifier, Arc::new(FakeMinter::default())),
            &[("authorization", "Bearer at")],
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_relative_exchange_path_is_rejected() {
        let state = ExchangeState::new(
            Arc::new(FakeVerifier::default()),
            Arc::new(FakeMinter::default()),
            "stack-access",
        );
        assert!(matches!(
            router(state.clone(), "api/auth/token-exchange"),
            Err(ExchangeError::Config(_))
        ));
        assert!(matches!(
            router(state, "/healthz"),
            Err(ExchangeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = app(FakeVerifier::default(), Arc::new(FakeMinter::default()))
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_from_config_requires_admin_token() {
        let config = Config::default();
        assert!(matches!(
            ExchangeState::from_config(&config),
            Err(ExchangeError::Config(_))
        ));

        let config = Config {
            backend_admin_token: Some("admin".to_string()),
            ..Config::default()
        };
        let state = ExchangeState::from_config(&config).unwrap();
        assert_eq!(state.session_cookie, config.server.idp_session_cookie);
    }
}
