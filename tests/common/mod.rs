#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use quizbank::{app::build_app, mail::RecordingMailer, memory::MemoryStore, state::AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.set_cookies().into_iter().find(|c| c.starts_with(&prefix))
    }

    pub fn data_str(&self, pointer: &str) -> String {
        self.body
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("missing {pointer} in {}", self.body))
            .to_string()
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub mailer: RecordingMailer,
}

impl TestApp {
    pub fn new() -> Self {
        let (state, store, mailer) = AppState::fake();
        Self {
            app: build_app(state.clone()),
            state,
            store,
            mailer,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut req = Request::builder().method(Method::GET).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/v1/auth/signup",
            None,
            json!({ "fullName": "Test User", "email": email, "password": password }),
        )
        .await
    }

    /// Token from the most recent verification mail sent to `email`.
    pub async fn verification_token(&self, email: &str) -> String {
        let sent = self.mailer.sent().await;
        let mail = sent
            .iter()
            .rev()
            .find(|m| m.to == email)
            .expect("verification mail");
        let start = mail.html.find("token=").expect("token in link") + "token=".len();
        let rest = &mail.html[start..];
        let end = rest.find('"').unwrap_or(rest.len());
        rest[..end].to_string()
    }

    pub async fn verify(&self, email: &str) -> TestResponse {
        let token = self.verification_token(email).await;
        self.get(&format!("/api/v1/auth/verify-email?token={token}"), None)
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/v1/auth/signin",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register, verify and log in. Returns `(access, refresh)`.
    pub async fn session(&self, email: &str) -> (String, String) {
        assert_eq!(self.register(email, PASSWORD).await.status, StatusCode::CREATED);
        assert_eq!(self.verify(email).await.status, StatusCode::OK);
        let res = self.login(email, PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        (
            res.data_str("/data/accessToken"),
            res.data_str("/data/refreshToken"),
        )
    }

    pub async fn upload(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        field: &str,
        file_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> TestResponse {
        let boundary = "quizbank-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }
}
