mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{TestApp, PASSWORD};
use jsonwebtoken::{encode, EncodingKey, Header};
use quizbank::{
    auth::claims::{Claims, TokenKind},
    users::{repo::UserRepo, repo_types::AccountStatus},
};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[tokio::test]
async fn login_is_forbidden_until_email_is_verified() {
    let t = TestApp::new();

    let res = t.register("ada@example.com", PASSWORD).await;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["data"]["user"]["isVerified"], false);
    assert!(res.body["data"].get("accessToken").is_none());

    let res = t.login("ada@example.com", PASSWORD).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["success"], false);

    let res = t.verify("ada@example.com").await;
    assert_eq!(res.status, StatusCode::OK);
    // verifying twice is harmless
    assert_eq!(t.verify("ada@example.com").await.status, StatusCode::OK);

    let res = t.login("ada@example.com", PASSWORD).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["email"], "ada@example.com");
    assert_eq!(res.body["data"]["user"]["isVerified"], true);
    assert!(res.body["data"]["user"].get("passwordHash").is_none());

    let access = res.data_str("/data/accessToken");
    let cookie = res.cookie("accessToken").expect("access cookie");
    assert!(cookie.starts_with(&format!("accessToken={access}")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(res.cookie("refreshToken").is_some());
}

#[tokio::test]
async fn verify_email_rejects_missing_or_bad_token() {
    let t = TestApp::new();
    let res = t.get("/api/v1/auth/verify-email", None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = t.get("/api/v1/auth/verify-email?token=garbage", None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_conflicts_regardless_of_password() {
    let t = TestApp::new();
    assert_eq!(
        t.register("ada@example.com", PASSWORD).await.status,
        StatusCode::CREATED
    );

    let res = t.register("ADA@example.com", "a-different-password").await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.body["statusCode"], 409);
    assert_eq!(res.body["success"], false);
    assert!(res.body["errors"].as_array().unwrap().is_empty());
    assert!(res.body["data"].is_null());
}

#[tokio::test]
async fn invalid_signup_payloads_are_bad_requests() {
    let t = TestApp::new();
    assert_eq!(
        t.register("not-an-email", PASSWORD).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        t.register("ada@example.com", "short").await.status,
        StatusCode::BAD_REQUEST
    );

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = t.send(req).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["success"], false);
}

#[tokio::test]
async fn concurrent_registrations_admit_one() {
    let t = TestApp::new();
    let mut handles = Vec::new();
    for i in 0..8 {
        let app = t.app.clone();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let body = json!({
                "fullName": "Racer",
                "email": "race@example.com",
                "password": format!("password-{i}"),
            });
            let req = Request::builder()
                .method(Method::POST)
                .uri("/api/v1/auth/signup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            app.oneshot(req).await.unwrap().status()
        }));
    }

    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn mail_failure_is_unavailable_but_account_stays() {
    let t = TestApp::new();
    t.mailer.set_failing(true);

    let res = t.register("ada@example.com", PASSWORD).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["message"], "Service unavailable: Error sending email!");

    let stored = t.store.find_by_email("ada@example.com").await.unwrap();
    assert!(stored.is_some());

    t.mailer.set_failing(false);
    assert_eq!(
        t.register("ada@example.com", PASSWORD).await.status,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn login_failures_map_to_bad_request_or_forbidden() {
    let t = TestApp::new();
    t.session("ada@example.com").await;

    let res = t
        .json(Method::POST, "/api/v1/auth/signin", None, json!({ "password": PASSWORD }))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    assert_eq!(
        t.login("nobody@example.com", PASSWORD).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        t.login("ada@example.com", "wrong-password").await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn banned_account_cannot_log_in_or_refresh() {
    let t = TestApp::new();
    let (_, refresh) = t.session("ada@example.com").await;
    let user = t.store.find_by_email("ada@example.com").await.unwrap().unwrap();
    t.store.set_status(user.id, AccountStatus::Banned).await;

    assert_eq!(
        t.login("ada@example.com", PASSWORD).await.status,
        StatusCode::FORBIDDEN
    );
    let res = t
        .json(
            Method::POST,
            "/api/v1/auth/refresh-token",
            None,
            json!({ "refreshToken": refresh }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_be_reused() {
    let t = TestApp::new();
    let (_, first) = t.session("ada@example.com").await;

    let res = t
        .json(
            Method::POST,
            "/api/v1/auth/refresh-token",
            None,
            json!({ "refreshToken": first }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let second = res.data_str("/data/refreshToken");
    assert_ne!(second, first);
    assert!(res.cookie("refreshToken").is_some());

    let res = t
        .json(
            Method::POST,
            "/api/v1/auth/refresh-token",
            None,
            json!({ "refreshToken": first }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Refresh token is expired or used");
}

#[tokio::test]
async fn refresh_reads_cookie_then_body_then_bearer() {
    let t = TestApp::new();
    let (_, refresh) = t.session("ada@example.com").await;

    // The cookie wins over a junk body value.
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/refresh-token")
        .header(header::COOKIE, format!("refreshToken={refresh}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "refreshToken": "junk" }).to_string()))
        .unwrap();
    let res = t.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    let rotated = res.data_str("/data/refreshToken");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/refresh-token")
        .header(header::AUTHORIZATION, format!("Bearer {rotated}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(t.send(req).await.status, StatusCode::OK);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/refresh-token")
        .body(Body::empty())
        .unwrap();
    let res = t.send(req).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Unauthorized request");
}

#[tokio::test]
async fn logout_revokes_refresh_and_clears_cookies() {
    let t = TestApp::new();
    let (access, refresh) = t.session("ada@example.com").await;

    // Browser-style logout: both cookies come back as removals.
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/logout")
        .header(header::COOKIE, format!("accessToken={access}; refreshToken={refresh}"))
        .body(Body::empty())
        .unwrap();
    let res = t.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    for name in ["accessToken", "refreshToken"] {
        let cleared = res.cookie(name).expect("removal cookie");
        assert!(cleared.starts_with(&format!("{name}=;")), "{cleared}");
        assert!(cleared.contains("Max-Age=0"), "{cleared}");
    }

    let res = t
        .json(
            Method::POST,
            "/api/v1/auth/refresh-token",
            None,
            json!({ "refreshToken": refresh }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_logout_still_clears_both_cookies() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;

    let res = t
        .json(Method::POST, "/api/v1/auth/logout", Some(access.as_str()), json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    for name in ["accessToken", "refreshToken"] {
        let cleared = res.cookie(name).expect("removal cookie");
        assert!(cleared.starts_with(&format!("{name}=;")), "{cleared}");
        assert!(cleared.contains("Max-Age=0"), "{cleared}");
    }
}

#[tokio::test]
async fn logout_requires_a_session() {
    let t = TestApp::new();
    let res = t.json(Method::POST, "/api/v1/auth/logout", None, json!({})).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

fn forged(secret: &str, sub: Uuid, exp: OffsetDateTime) -> String {
    let claims = Claims {
        sub,
        iat: (exp - Duration::minutes(5)).unix_timestamp() as usize,
        exp: exp.unix_timestamp() as usize,
        iss: "test-issuer".into(),
        aud: "test-aud".into(),
        kind: TokenKind::Access,
        jti: Uuid::new_v4(),
        email: None,
        full_name: None,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[tokio::test]
async fn bad_access_tokens_are_rejected_on_every_protected_route() {
    let t = TestApp::new();
    let (_, refresh) = t.session("ada@example.com").await;
    let user = t.store.find_by_email("ada@example.com").await.unwrap().unwrap();

    let now = OffsetDateTime::now_utc();
    let wrong_secret = forged("not-the-access-secret", user.id, now + Duration::minutes(5));
    let expired = forged("test-access", user.id, now - Duration::hours(1));

    let routes: [(Method, &str); 8] = [
        (Method::GET, "/api/v1/user/"),
        (Method::PATCH, "/api/v1/user/update-profile"),
        (Method::GET, "/api/v1/category/"),
        (Method::GET, "/api/v1/category/withQuestionCount"),
        (Method::GET, "/api/v1/question/category"),
        (Method::POST, "/api/v1/question/submitAnswer"),
        (Method::GET, "/api/v1/question/searchWithAnswer?searchQuery=x"),
        (Method::POST, "/api/v1/auth/logout"),
    ];

    for token in [&wrong_secret, &expired, &refresh] {
        for (method, uri) in routes.iter() {
            let res = t.json(method.clone(), uri, Some(token.as_str()), json!({})).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(res.body["success"], false);
        }
    }

    let res = t.get("/api/v1/user/", Some(expired.as_str())).await;
    assert_eq!(res.body["message"], "jwt expired");
}

#[tokio::test]
async fn access_token_is_accepted_from_cookie_and_json_body() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;

    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/user/")
        .header(header::COOKIE, format!("accessToken={access}"))
        .body(Body::empty())
        .unwrap();
    let res = t.send(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["email"], "ada@example.com");

    // The body is still readable by the handler after the guard looked at it.
    let res = t
        .json(
            Method::PATCH,
            "/api/v1/user/update-profile",
            None,
            json!({ "accessToken": access, "fullName": "Ada King", "email": "ada@example.com" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["data"]["user"]["fullName"], "Ada King");
}

#[tokio::test]
async fn unknown_routes_get_the_error_envelope() {
    let t = TestApp::new();
    let res = t.get("/api/v1/does-not-exist", None).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["message"], "Endpoint Not Found");

    let res = t.json(Method::POST, "/nowhere", None, json!({})).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["success"], false);
}

#[tokio::test]
async fn health_and_ping() {
    let t = TestApp::new();
    let res = t.get("/api/v1/healthcheck", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["response"]["status"], true);
    assert_eq!(res.body["response"]["message"], "Healthy");

    t.store.set_offline(true);
    let res = t.get("/api/v1/healthcheck", None).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);

    let res = t.get("/ping", None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "pong");
}
