//! The client send path
//!
//! `dispatch` does everything that depends on the credential (URL, header
//! decoration, body encoding) synchronously and returns a boxed future that
//! only performs I/O. The coordinator relies on this: it calls `replay` for
//! each released request in queue order, so the requests are built in FIFO
//! order with the renewed credential before any of them is awaited.

use std::sync::Arc;
use std::time::Instant;

use refresh::{Error, RefreshCoordinator, Replay, ReplayFuture, Result};
use request::{
    Attempt, Body, CredentialDecorator, Decorator, MultipartBody, RequestDescriptor, RequestKind,
    Response, StatusCode, Url,
};
use reqwest::cookie::Jar;
use reqwest::multipart::{Form, Part};
use session_auth::{
    CredentialStore, EndpointRenewer, LoginRequest, LoginResponse, SessionNotice,
    SessionTerminator, Storage,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::options::{ClientOptions, Endpoints};

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: reqwest::Client,
    base_url: Url,
    timeout: std::time::Duration,
    decorator: Box<dyn Decorator>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
    endpoints: Endpoints,
}

impl HttpClient {
    /// Build a client, restoring any session left in `storage`.
    pub async fn connect(options: ClientOptions, storage: Arc<dyn Storage>) -> Result<Self> {
        let store = Arc::new(CredentialStore::restore(storage).await?);

        let jar = Arc::new(Jar::default());
        let transport = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| Error::Network(format!("building HTTP transport: {e}")))?;

        let renewal_url = join(&options.base_url, &options.endpoints.renewal)?;
        // Renewal shares the transport (and its cookies) but never goes
        // through this client, so its own 401 can't start another renewal.
        let renewer = Arc::new(EndpointRenewer::new(
            transport.clone(),
            renewal_url,
            options.timeout,
        ));
        let terminator = Arc::new(SessionTerminator::new(
            Arc::clone(&store),
            options.endpoints.entry_point.clone(),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            renewer,
            Arc::clone(&terminator),
        ));
        let decorator = CredentialDecorator::new(options.headers, options.anti_forgery, jar);

        info!(
            base_url = %options.base_url,
            signed_in = store.is_signed_in(),
            "client ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                base_url: options.base_url,
                timeout: options.timeout,
                decorator: Box::new(decorator),
                store,
                coordinator,
                terminator,
                endpoints: options.endpoints,
            }),
        })
    }

    /// Send a request. A 401 is recovered transparently when possible.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Response> {
        self.dispatch(Arc::new(request), Attempt::First).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(RequestDescriptor::get(path)).await
    }

    /// Sign in. On success the pair and the returned profile are stored and
    /// a later expiry can end the session again.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| Error::InvalidRequest(format!("encoding login body: {e}")))?;
        let request = RequestDescriptor::post(&self.inner.endpoints.login)
            .with_kind(RequestKind::CredentialIssuance)
            .json(body);

        let response = self.send(request).await?;
        let login: LoginResponse = response
            .json()
            .map_err(|e| Error::Login(format!("unreadable login response: {e}")))?;
        if !login.is_success() {
            return Err(Error::Login(login.message));
        }
        let credential = login
            .credential()
            .ok_or_else(|| Error::Login("login response carried no credential".into()))?;

        if let Err(e) = self.inner.store.write(credential).await {
            warn!(error = %e, "failed to persist credential after login");
        }
        if let Some(profile) = &login.user_info
            && let Err(e) = self.inner.store.set_profile(profile.clone()).await
        {
            warn!(error = %e, "failed to persist profile after login");
        }
        self.inner.terminator.rearm();
        info!("signed in");
        Ok(login)
    }

    /// Sign out. The local session is cleared whatever the endpoint answers;
    /// an endpoint failure is still reported. No expiry notice is emitted.
    pub async fn logout(&self) -> Result<()> {
        let request = RequestDescriptor::post(&self.inner.endpoints.logout)
            .with_kind(RequestKind::SessionTermination);
        let outcome = self.send(request).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "logout request failed, clearing local session anyway");
        }
        self.inner.store.clear().await?;
        info!("signed out");
        outcome.map(|_| ())
    }

    /// Fetch the signed-in user's profile and cache it.
    pub async fn fetch_profile(&self) -> Result<serde_json::Value> {
        let response = self.get(&self.inner.endpoints.profile).await?;
        let profile: serde_json::Value = response
            .json()
            .map_err(|e| Error::InvalidRequest(format!("unreadable profile response: {e}")))?;
        if let Err(e) = self.inner.store.set_profile(profile.clone()).await {
            warn!(error = %e, "failed to cache profile");
        }
        Ok(profile)
    }

    /// Session notices (expiry) for the host application.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.terminator.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn entry_point(&self) -> &str {
        self.inner.terminator.entry_point()
    }

    fn dispatch(&self, request: Arc<RequestDescriptor>, attempt: Attempt) -> ReplayFuture {
        let prepared = self.prepare(&request);
        let client = self.clone();
        Box::pin(async move {
            let (builder, sent_with) = prepared?;
            client.execute(request, attempt, builder, sent_with).await
        })
    }

    /// Build the outgoing request with the credential current right now.
    /// Returns the builder and the access token it carries.
    fn prepare(
        &self,
        request: &RequestDescriptor,
    ) -> Result<(reqwest::RequestBuilder, Option<String>)> {
        let url = join(&self.inner.base_url, &request.path)?;
        let credential = self.inner.store.read();
        let headers = self
            .inner
            .decorator
            .decorate(request, &url, credential.as_ref());

        let builder = self
            .inner
            .transport
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(self.inner.timeout);
        let builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.body(
                serde_json::to_vec(value)
                    .map_err(|e| Error::InvalidRequest(format!("encoding JSON body: {e}")))?,
            ),
            Body::Multipart(form) => builder.multipart(multipart_form(form)?),
        };

        let sent_with = credential
            .filter(|c| c.has_access_token())
            .map(|c| c.access_token().to_owned());
        Ok((builder, sent_with))
    }

    async fn execute(
        &self,
        request: Arc<RequestDescriptor>,
        attempt: Attempt,
        builder: reqwest::RequestBuilder,
        sent_with: Option<String>,
    ) -> Result<Response> {
        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            warn!(request_id = %request.id, path = %request.path, error = %e, "request failed");
            Error::Network(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading response body: {e}")))?;

        debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            replay = attempt.is_replay(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "response received"
        );

        if status == StatusCode::UNAUTHORIZED {
            let replay: Arc<dyn Replay> = Arc::new(self.clone());
            return self
                .inner
                .coordinator
                .recover(request, attempt, sent_with, replay)
                .await;
        }

        if !status.is_success() {
            return Err(Error::Status {
                status,
                path: request.path.clone(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

impl Replay for HttpClient {
    fn replay(&self, request: Arc<RequestDescriptor>) -> ReplayFuture {
        self.dispatch(request, Attempt::Replay)
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    let separator = if path.starts_with('/') { "" } else { "/" };
    let raw = format!("{}{separator}{path}", base.as_str().trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| Error::InvalidRequest(format!("invalid URL {raw}: {e}")))
}

fn multipart_form(body: &MultipartBody) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in &body.text {
        form = form.text(name.clone(), value.clone());
    }
    for file in &body.files {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| Error::InvalidRequest(format!("invalid part type: {e}")))?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Json;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use futures_util::future::join_all;
    use session_auth::{Credential, MemoryStorage};
    use tokio::net::TcpListener;

    /// In-process backend that accepts A1 until renewal, then only A2.
    #[derive(Default)]
    struct Backend {
        renewals: AtomicUsize,
        renewal_fails: AtomicBool,
        logouts: AtomicUsize,
        seen_auth: Mutex<Vec<String>>,
        seen_csrf: Mutex<Vec<Option<String>>>,
    }

    impl Backend {
        fn seen_auth(&self) -> Vec<String> {
            self.seen_auth.lock().unwrap().clone()
        }
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn login(Json(body): Json<serde_json::Value>) -> axum::response::Response {
        if body["password"] != "pw" {
            return (axum::http::StatusCode::UNAUTHORIZED, "bad credentials").into_response();
        }
        if body["email"] == "blocked@example.com" {
            return Json(serde_json::json!({"message": "fail"})).into_response();
        }
        (
            [(header::SET_COOKIE, "XSRF-TOKEN=csrf-abc; Path=/")],
            Json(serde_json::json!({
                "message": "success",
                "userInfo": {"email": body["email"], "nickname": "kim"},
                "accessToken": "A1",
                "refreshToken": "R1",
            })),
        )
            .into_response()
    }

    async fn reissue(
        State(backend): State<Arc<Backend>>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        backend.renewals.fetch_add(1, Ordering::SeqCst);
        // Hold the renewal open so every concurrent 401 lands in the queue.
        tokio::time::sleep(Duration::from_millis(100)).await;
        if backend.renewal_fails.load(Ordering::SeqCst) || body["refreshToken"] != "R1" {
            return (axum::http::StatusCode::UNAUTHORIZED, "refresh expired").into_response();
        }
        Json(serde_json::json!({"accessToken": "A2", "refreshToken": "R2"})).into_response()
    }

    async fn plan(
        State(backend): State<Arc<Backend>>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        let auth = bearer(&headers);
        backend.seen_auth.lock().unwrap().push(auth.clone());
        backend
            .seen_csrf
            .lock()
            .unwrap()
            .push(headers.get("x-xsrf-token").map(|v| v.to_str().unwrap().to_string()));
        if auth == "Bearer A2" {
            format!("plan {id}").into_response()
        } else {
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }

    async fn create_plan(
        State(backend): State<Arc<Backend>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        let csrf = headers.get("x-xsrf-token").map(|v| v.to_str().unwrap().to_string());
        backend.seen_csrf.lock().unwrap().push(csrf.clone());
        if csrf.as_deref() != Some("csrf-abc") {
            return axum::http::StatusCode::FORBIDDEN.into_response();
        }
        if bearer(&headers) != "Bearer A1" {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({"created": body["title"]})).into_response()
    }

    async fn board_write(headers: HeaderMap, body: String) -> axum::response::Response {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("multipart/form-data; boundary=") {
            return (axum::http::StatusCode::BAD_REQUEST, content_type.to_string())
                .into_response();
        }
        if !body.contains("Jeju trip") || !body.contains("filename=\"jeju.txt\"") {
            return axum::http::StatusCode::BAD_REQUEST.into_response();
        }
        "written".into_response()
    }

    async fn profile(headers: HeaderMap) -> axum::response::Response {
        if bearer(&headers) != "Bearer A1" {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({"email": "kim@example.com", "nickname": "kim"})).into_response()
    }

    async fn logout(State(backend): State<Arc<Backend>>) -> &'static str {
        backend.logouts.fetch_add(1, Ordering::SeqCst);
        "bye"
    }

    async fn start_backend(backend: Arc<Backend>) -> Url {
        let router = axum::Router::new()
            .route("/member/login", post(login))
            .route("/member/logout", post(logout))
            .route("/member/fetchMyInfo", get(profile))
            .route("/auth/reissue", post(reissue))
            .route("/plan", post(create_plan))
            .route("/plan/{id}", get(plan))
            .route("/board/write", post(board_write))
            .route(
                "/always-401",
                get(|| async { axum::http::StatusCode::UNAUTHORIZED }),
            )
            .with_state(backend);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    /// Client whose storage already holds the A1/R1 pair.
    async fn signed_in_client(base_url: Url) -> (HttpClient, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::with_entries(&[
            ("accessToken", "A1"),
            ("refreshToken", "R1"),
        ]));
        let client = HttpClient::connect(ClientOptions::new(base_url), storage.clone())
            .await
            .unwrap();
        (client, storage)
    }

    #[tokio::test]
    async fn concurrent_expiry_renews_once_and_replays_all() {
        let backend = Arc::new(Backend::default());
        let (client, storage) = signed_in_client(start_backend(backend.clone()).await).await;

        let results = join_all((0..5).map(|i| {
            let client = client.clone();
            async move { client.get(&format!("/plan/{i}")).await }
        }))
        .await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().text(), format!("plan {i}"));
        }
        assert_eq!(backend.renewals.load(Ordering::SeqCst), 1);

        let seen = backend.seen_auth();
        assert_eq!(seen.iter().filter(|a| *a == "Bearer A2").count(), 5);
        assert_eq!(seen.iter().filter(|a| *a == "Bearer A1").count(), 5);

        let cred = client.store().read().unwrap();
        assert_eq!(cred.access_token(), "A2");
        assert_eq!(cred.refresh_token(), "R2");
        assert_eq!(storage.snapshot()["accessToken"], "A2");
        assert!(!client.coordinator().is_refreshing());
    }

    #[tokio::test]
    async fn failed_renewal_ends_session_once() {
        let backend = Arc::new(Backend::default());
        backend.renewal_fails.store(true, Ordering::SeqCst);
        let (client, storage) = signed_in_client(start_backend(backend.clone()).await).await;
        let mut notices = client.subscribe();

        let results = join_all((0..5).map(|i| {
            let client = client.clone();
            async move { client.get(&format!("/plan/{i}")).await }
        }))
        .await;

        for result in results {
            let err = result.unwrap_err();
            assert!(err.is_session_expired(), "got {err:?}");
        }
        assert_eq!(backend.renewals.load(Ordering::SeqCst), 1);
        assert!(!client.store().is_signed_in());
        assert!(storage.snapshot().is_empty());

        assert_eq!(
            notices.try_recv().unwrap(),
            SessionNotice::Expired {
                entry_point: "/login".into()
            }
        );
        assert!(notices.try_recv().is_err(), "more than one notice");
    }

    #[tokio::test]
    async fn replayed_request_rejected_again_is_not_retried() {
        let backend = Arc::new(Backend::default());
        let (client, _storage) = signed_in_client(start_backend(backend.clone()).await).await;

        let err = client.get("/always-401").await.unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { .. }), "got {err:?}");
        assert_eq!(backend.renewals.load(Ordering::SeqCst), 1);
        assert!(client.store().is_signed_in());
    }

    #[tokio::test]
    async fn login_401_is_surfaced_without_renewal() {
        let backend = Arc::new(Backend::default());
        let (client, _storage) = signed_in_client(start_backend(backend.clone()).await).await;

        let err = client.login("kim@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }), "got {err:?}");
        assert_eq!(backend.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn login_rejection_message_is_reported() {
        let backend = Arc::new(Backend::default());
        let base_url = start_backend(backend).await;
        let client = HttpClient::connect(ClientOptions::new(base_url), Arc::new(MemoryStorage::new()))
            .await
            .unwrap();

        let err = client.login("blocked@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, Error::Login(ref m) if m == "fail"), "got {err:?}");
        assert!(!client.store().is_signed_in());
    }

    #[tokio::test]
    async fn login_stores_pair_profile_and_cookie() {
        let backend = Arc::new(Backend::default());
        let base_url = start_backend(backend.clone()).await;
        let storage = Arc::new(MemoryStorage::new());
        let client = HttpClient::connect(ClientOptions::new(base_url), storage.clone())
            .await
            .unwrap();

        let login = client.login("kim@example.com", "pw").await.unwrap();
        assert!(login.is_success());
        assert_eq!(client.store().read().unwrap().access_token(), "A1");
        assert_eq!(client.store().profile().unwrap()["nickname"], "kim");
        assert!(storage.snapshot().contains_key("loginUser"));

        // State-changing request carries the anti-forgery cookie value.
        let created = client
            .send(RequestDescriptor::post("/plan").json(serde_json::json!({"title": "Jeju"})))
            .await
            .unwrap();
        assert_eq!(created.json::<serde_json::Value>().unwrap()["created"], "Jeju");
    }

    #[tokio::test]
    async fn safe_requests_carry_no_anti_forgery_header() {
        let backend = Arc::new(Backend::default());
        let base_url = start_backend(backend.clone()).await;
        let client = HttpClient::connect(ClientOptions::new(base_url), Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        client.login("kim@example.com", "pw").await.unwrap();
        client.store().write(Credential::new("A2", "R2")).await.unwrap();

        client.get("/plan/7").await.unwrap();
        assert_eq!(*backend.seen_csrf.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn multipart_upload_lets_transport_set_boundary() {
        let backend = Arc::new(Backend::default());
        let (client, _storage) = signed_in_client(start_backend(backend).await).await;

        let request = RequestDescriptor::post("/board/write")
            .with_header("content-type", "application/json")
            .multipart(
                MultipartBody::new()
                    .text("title", "Jeju trip")
                    .file("file", "jeju.txt", Some("text/plain"), b"sunny".to_vec()),
            );
        let response = client.send(request).await.unwrap();
        assert_eq!(response.text(), "written");
    }

    #[tokio::test]
    async fn logout_clears_session_without_notice() {
        let backend = Arc::new(Backend::default());
        let (client, storage) = signed_in_client(start_backend(backend.clone()).await).await;
        let mut notices = client.subscribe();

        client.logout().await.unwrap();

        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
        assert!(!client.store().is_signed_in());
        assert!(storage.snapshot().is_empty());
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn logout_clears_locally_when_endpoint_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base_url = Url::parse(&format!("http://{addr}")).unwrap();
        let (client, storage) = signed_in_client(base_url).await;

        let err = client.logout().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got {err:?}");
        assert!(!client.store().is_signed_in());
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn fetch_profile_caches_result() {
        let backend = Arc::new(Backend::default());
        let (client, storage) = signed_in_client(start_backend(backend).await).await;

        let profile = client.fetch_profile().await.unwrap();
        assert_eq!(profile["nickname"], "kim");
        assert_eq!(client.store().profile().unwrap()["email"], "kim@example.com");
        assert!(storage.snapshot().contains_key("loginUser"));
    }

    #[tokio::test]
    async fn non_401_errors_propagate_unchanged() {
        let backend = Arc::new(Backend::default());
        let base_url = start_backend(backend.clone()).await;
        let client = HttpClient::connect(ClientOptions::new(base_url), Arc::new(MemoryStorage::new()))
            .await
            .unwrap();

        // No anti-forgery cookie yet, so the backend answers 403.
        let err = client
            .send(RequestDescriptor::post("/plan").json(serde_json::json!({})))
            .await
            .unwrap_err();
        match err {
            Error::Status { status, .. } => assert_eq!(status, StatusCode::FORBIDDEN),
            other => panic!("expected Status, got {other:?}"),
        }
        assert_eq!(backend.renewals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn join_handles_slashes() {
        let base = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(
            join(&base, "/member/login").unwrap().as_str(),
            "http://localhost:8080/member/login"
        );
        assert_eq!(
            join(&base, "plan/3").unwrap().as_str(),
            "http://localhost:8080/plan/3"
        );

        let prefixed = Url::parse("http://localhost:8080/api").unwrap();
        assert_eq!(
            join(&prefixed, "/auth/reissue").unwrap().as_str(),
            "http://localhost:8080/api/auth/reissue"
        );
    }
}
