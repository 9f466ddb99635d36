mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn current_user_hides_secrets() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;

    let res = t.get("/api/v1/user/", Some(access.as_str())).await;
    assert_eq!(res.status, StatusCode::OK);
    let user = &res.body["data"]["user"];
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["status"], "verified");
    assert!(user.get("passwordHash").is_none());
    assert!(user.get("refreshToken").is_none());
}

#[tokio::test]
async fn update_profile_rules() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;
    t.session("bob@example.com").await;

    let res = t
        .json(
            Method::PATCH,
            "/api/v1/user/update-profile",
            Some(access.as_str()),
            json!({ "fullName": "Ada" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "All fields are required");

    let res = t
        .json(
            Method::PATCH,
            "/api/v1/user/update-profile",
            Some(access.as_str()),
            json!({ "fullName": "Ada", "email": "BOB@example.com" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::CONFLICT);

    let res = t
        .json(
            Method::PATCH,
            "/api/v1/user/update-profile",
            Some(access.as_str()),
            json!({ "fullName": "Ada Byron", "email": "ada.byron@example.com" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["fullName"], "Ada Byron");
    assert_eq!(res.body["data"]["user"]["email"], "ada.byron@example.com");

    assert_eq!(
        t.login("ada.byron@example.com", common::PASSWORD).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn avatar_upload_is_served_from_public_temp() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;

    let res = t
        .upload(
            Method::PATCH,
            "/api/v1/user/update-avatar",
            &access,
            "avatar",
            "me.png",
            "image/png",
            b"\x89PNG\r\n\x1a\nfake",
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);

    let avatar = res.body["data"]["avatar"].as_str().unwrap().to_string();
    let prefix = format!("{}/temp/avatar-", t.state.config.public_base_url);
    assert!(avatar.starts_with(&prefix), "{avatar}");
    assert!(avatar.ends_with(".png"));

    let file_name = avatar.rsplit('/').next().unwrap();
    let on_disk = t.state.config.public_dir.join("temp").join(file_name);
    assert!(on_disk.exists());

    let res = t.get(&format!("/temp/{file_name}"), None).await;
    assert_eq!(res.status, StatusCode::OK);
    std::fs::remove_file(on_disk).unwrap();
}

#[tokio::test]
async fn avatar_upload_rejects_missing_or_non_image_files() {
    let t = TestApp::new();
    let (access, _) = t.session("ada@example.com").await;

    let res = t
        .upload(
            Method::PATCH,
            "/api/v1/user/update-avatar",
            &access,
            "picture",
            "me.png",
            "image/png",
            b"png",
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Avatar file is missing");

    let res = t
        .upload(
            Method::PATCH,
            "/api/v1/user/update-avatar",
            &access,
            "avatar",
            "notes.pdf",
            "application/pdf",
            b"%PDF",
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}
