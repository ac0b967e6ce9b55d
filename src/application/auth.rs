use crate::domain::models::{AuthTokens, validate_non_empty};
use crate::infrastructure::backend_client::{AuthApi, AuthResponse, Credentials};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Source of the bearer token for authorized backend calls.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Result<Option<String>, InfraError>;

    /// Exchanges the stored refresh token for a new pair. `Ok(false)` means the
    /// session is gone and the caller should stop retrying.
    async fn refresh(&self) -> Result<bool, InfraError>;
}

/// Runs `call` with the current token; on `Unauthorized` refreshes once and
/// retries with the new token.
pub async fn with_token_refresh<P, T, F, Fut>(tokens: &P, call: F) -> Result<T, InfraError>
where
    P: AccessTokenProvider + ?Sized,
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<T, InfraError>>,
{
    match call(tokens.access_token()?).await {
        Err(InfraError::Unauthorized(message)) => {
            if tokens.refresh().await? {
                call(tokens.access_token()?).await
            } else {
                Err(InfraError::Unauthorized(message))
            }
        }
        other => other,
    }
}

pub struct AuthManager<A, S>
where
    A: AuthApi + ?Sized,
    S: CredentialStore + ?Sized,
{
    api: Arc<A>,
    credential_store: Arc<S>,
}

impl<A, S> AuthManager<A, S>
where
    A: AuthApi + ?Sized,
    S: CredentialStore + ?Sized,
{
    pub fn new(api: Arc<A>, credential_store: Arc<S>) -> Self {
        Self {
            api,
            credential_store,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, InfraError> {
        let credentials = credentials(username, password)?;
        let response = self.api.login(&credentials).await?;
        self.store_response(response, "Logged in")
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<String, InfraError> {
        let credentials = credentials(username, password)?;
        let response = self.api.signup(&credentials).await?;
        self.store_response(response, "Account created")
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.credential_store.clear_tokens()
    }

    pub fn is_logged_in(&self) -> Result<bool, InfraError> {
        Ok(self.credential_store.load_tokens()?.is_some())
    }

    fn store_response(&self, response: AuthResponse, fallback_message: &str) -> Result<String, InfraError> {
        let tokens = AuthTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        };
        self.credential_store.save_tokens(&tokens)?;
        Ok(response
            .message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| fallback_message.to_string()))
    }
}

fn credentials(username: &str, password: &str) -> Result<Credentials, InfraError> {
    validate_non_empty(username, "username").map_err(InfraError::InvalidConfig)?;
    validate_non_empty(password, "password").map_err(InfraError::InvalidConfig)?;
    Ok(Credentials {
        username: username.trim().to_string(),
        password: password.to_string(),
    })
}

#[async_trait]
impl<A, S> AccessTokenProvider for AuthManager<A, S>
where
    A: AuthApi + ?Sized,
    S: CredentialStore + ?Sized,
{
    fn access_token(&self) -> Result<Option<String>, InfraError> {
        Ok(self
            .credential_store
            .load_tokens()?
            .map(|tokens| tokens.access_token))
    }

    async fn refresh(&self) -> Result<bool, InfraError> {
        let Some(stored) = self.credential_store.load_tokens()? else {
            return Ok(false);
        };
        if stored.refresh_token.trim().is_empty() {
            self.credential_store.clear_tokens()?;
            return Ok(false);
        }

        match self.api.refresh(&stored.refresh_token).await {
            Ok(response) => {
                let refresh_token = if response.refresh_token.trim().is_empty() {
                    stored.refresh_token
                } else {
                    response.refresh_token
                };
                self.credential_store.save_tokens(&AuthTokens {
                    access_token: response.access_token,
                    refresh_token,
                })?;
                Ok(true)
            }
            Err(error) if session_rejected(&error) => {
                self.credential_store.clear_tokens()?;
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }
}

/// True when the server refused the refresh token itself (401 or another
/// 4xx). Network and 5xx failures leave the session in place.
fn session_rejected(error: &InfraError) -> bool {
    match error {
        InfraError::Unauthorized(_) => true,
        InfraError::Http(message) => message.starts_with("http 4"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeAuthApi {
        refresh_responses: Mutex<VecDeque<Result<AuthResponse, InfraError>>>,
        login_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
    }

    impl FakeAuthApi {
        fn with_refresh(responses: Vec<Result<AuthResponse, InfraError>>) -> Self {
            Self {
                refresh_responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }
    }

    fn response(access: &str, refresh: &str) -> AuthResponse {
        AuthResponse {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            message: None,
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuthApi {
        async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, InfraError> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if credentials.password == "wrong" {
                return Err(InfraError::Unauthorized("http 401 while logging in".to_string()));
            }
            Ok(AuthResponse {
                message: Some(format!("Welcome {}", credentials.username)),
                ..response("access-1", "refresh-1")
            })
        }

        async fn signup(&self, _credentials: &Credentials) -> Result<AuthResponse, InfraError> {
            Ok(response("access-new", "refresh-new"))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<AuthResponse, InfraError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_responses
                .lock()
                .expect("refresh lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(InfraError::Http("no refresh scripted".to_string())))
        }
    }

    fn manager(api: FakeAuthApi) -> (Arc<FakeAuthApi>, Arc<InMemoryCredentialStore>, AuthManager<FakeAuthApi, InMemoryCredentialStore>) {
        let api = Arc::new(api);
        let store = Arc::new(InMemoryCredentialStore::default());
        let manager = AuthManager::new(Arc::clone(&api), Arc::clone(&store));
        (api, store, manager)
    }

    #[tokio::test]
    async fn login_stores_tokens_and_returns_backend_message() {
        let (_, store, manager) = manager(FakeAuthApi::default());
        let message = manager.login(" ada ", "secret").await.expect("login");
        assert_eq!(message, "Welcome ada");
        assert!(manager.is_logged_in().expect("logged in"));
        assert_eq!(
            store.load_tokens().expect("load").map(|tokens| tokens.access_token),
            Some("access-1".to_string())
        );
    }

    #[tokio::test]
    async fn blank_credentials_are_rejected_before_any_request() {
        let (api, _, manager) = manager(FakeAuthApi::default());
        assert!(matches!(
            manager.login("", "secret").await,
            Err(InfraError::InvalidConfig(_))
        ));
        assert!(matches!(
            manager.login("ada", "  ").await,
            Err(InfraError::InvalidConfig(_))
        ));
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let (_, _, manager) = manager(FakeAuthApi::default());
        manager.signup("ada", "secret").await.expect("signup");
        manager.logout().expect("logout");
        assert!(!manager.is_logged_in().expect("state"));
        assert_eq!(manager.access_token().expect("token"), None);
    }

    #[tokio::test]
    async fn unauthorized_call_refreshes_once_and_retries() {
        let (api, _, manager) =
            manager(FakeAuthApi::with_refresh(vec![Ok(response("access-2", ""))]));
        manager.login("ada", "secret").await.expect("login");

        let seen = Mutex::new(Vec::new());
        let result = with_token_refresh(&manager, |token| {
            seen.lock().expect("seen lock").push(token.clone());
            async move {
                match token.as_deref() {
                    Some("access-2") => Ok("fresh"),
                    _ => Err(InfraError::Unauthorized("http 401".to_string())),
                }
            }
        })
        .await
        .expect("retried call");

        assert_eq!(result, "fresh");
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            seen.into_inner().expect("seen"),
            vec![Some("access-1".to_string()), Some("access-2".to_string())]
        );
        // An empty refresh token in the response keeps the stored one.
        let stored = manager.credential_store.load_tokens().expect("load").expect("tokens");
        assert_eq!(stored.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn failed_refresh_clears_tokens_and_surfaces_unauthorized() {
        let (api, _, manager) =
            manager(FakeAuthApi::with_refresh(vec![Err(InfraError::Unauthorized(
                "http 401 while refreshing token".to_string(),
            ))]));
        manager.login("ada", "secret").await.expect("login");

        let result: Result<(), InfraError> = with_token_refresh(&manager, |_| async {
            Err(InfraError::Unauthorized("http 401".to_string()))
        })
        .await;

        assert!(matches!(result, Err(InfraError::Unauthorized(_))));
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(!manager.is_logged_in().expect("state"));
    }

    #[tokio::test]
    async fn rejected_refresh_token_with_client_error_clears_session() {
        let (_, _, manager) = manager(FakeAuthApi::with_refresh(vec![Err(InfraError::Http(
            "http 400 while refreshing token; body=invalid refresh token".to_string(),
        ))]));
        manager.login("ada", "secret").await.expect("login");

        assert!(!manager.refresh().await.expect("refresh"));
        assert!(!manager.is_logged_in().expect("state"));
    }

    #[tokio::test]
    async fn network_failure_during_refresh_keeps_session() {
        let (api, _, manager) = manager(FakeAuthApi::with_refresh(vec![
            Err(InfraError::Http(
                "network error while refreshing token: connection refused".to_string(),
            )),
            Err(InfraError::Http("http 503 while refreshing token".to_string())),
        ]));
        manager.login("ada", "secret").await.expect("login");

        let result: Result<(), InfraError> = with_token_refresh(&manager, |_| async {
            Err(InfraError::Unauthorized("http 401".to_string()))
        })
        .await;
        match result {
            Err(InfraError::Http(message)) => assert!(message.contains("network error")),
            other => panic!("expected network error, got {other:?}"),
        }
        assert!(matches!(manager.refresh().await, Err(InfraError::Http(_))));

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 2);
        assert!(manager.is_logged_in().expect("state"));
        assert_eq!(manager.access_token().expect("token"), Some("access-1".to_string()));
    }

    #[tokio::test]
    async fn anonymous_unauthorized_call_does_not_refresh() {
        let (api, _, manager) = manager(FakeAuthApi::default());
        let result: Result<(), InfraError> = with_token_refresh(&manager, |token| async move {
            assert_eq!(token, None);
            Err(InfraError::Unauthorized("http 401".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    }

    proptest! {
        #[test]
        fn non_auth_errors_pass_through_without_refresh(message in "[a-z ]{1,24}") {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let (api, _, manager) = manager(FakeAuthApi::default());
                manager.login("ada", "secret").await.expect("login");
                let result: Result<(), InfraError> = with_token_refresh(&manager, |_| {
                    let message = message.clone();
                    async move { Err(InfraError::Http(message)) }
                })
                .await;
                assert!(matches!(result, Err(InfraError::Http(_))));
                assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
                assert!(manager.is_logged_in().expect("state"));
            });
        }
    }
}
