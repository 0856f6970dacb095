#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use notecast_api::config::ApiConfig;
use notecast_api::mailer::{Mailer, OutgoingMail};
use notecast_api::media::DiskMediaStore;
use notecast_api::{AppState, AppStateInner, router};
use notecast_db::{Database, now_ms};

pub const PASSWORD: &str = "Str0ng!pass";

/// Keeps every mail so tests can read OTPs back out of them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

impl RecordingMailer {
    pub fn last_to(&self, to: &str) -> Option<OutgoingMail> {
        self.sent.lock().unwrap().iter().rev().find(|m| m.to == to).cloned()
    }

    pub fn count_to(&self, to: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|m| m.to == to).count()
    }

    pub fn last_otp(&self, to: &str) -> String {
        let mail = self.last_to(to).expect("no mail sent to this address");
        mail.text
            .strip_prefix("Your OTP: ")
            .expect("mail carries no OTP")
            .to_string()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub router: Router,
}

pub async fn test_app() -> TestApp {
    let media_dir = std::env::temp_dir().join(format!("notecast-it-{}", Uuid::new_v4()));
    let config = ApiConfig::from_lookup(|key| match key {
        "NOTECAST_ENV" => Some("development".into()),
        "NOTECAST_JWT_SECRET" => Some("integration-test-secret".into()),
        "NOTECAST_MEDIA_DIR" => Some(media_dir.to_string_lossy().into_owned()),
        _ => None,
    })
    .unwrap();

    let db = Arc::new(Database::open_in_memory().unwrap());
    let media = DiskMediaStore::new(config.media_dir.clone(), &config.public_url)
        .await
        .unwrap();
    let mailer = Arc::new(RecordingMailer::default());

    let state: AppState = Arc::new(AppStateInner::new(db, config, mailer.clone(), Arc::new(media)));
    TestApp {
        router: router(state.clone()),
        state,
        mailer,
    }
}

impl TestApp {
    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Sign up and confirm a user, returning their id and first token.
    pub async fn confirmed_user(&self, name: &str, email: &str) -> (Uuid, String) {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": PASSWORD,
                    "passwordConfirm": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let otp = self.mailer.last_otp(&email.to_lowercase());
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/auth/confirmEmail",
                None,
                Some(json!({ "email": email, "otp": otp })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let token = body["token"].as_str().unwrap().to_string();

        let (_, me) = self.call(Method::GET, "/api/v1/users/me", Some(&token), None).await;
        let id = Uuid::parse_str(me["data"]["id"].as_str().unwrap()).unwrap();
        (id, token)
    }

    /// Push the user's current OTP past its expiry, keeping the code.
    pub fn expire_otp(&self, email: &str) {
        let user = self.state.db.get_user_by_email(email).unwrap().unwrap();
        let hash = user.otp_hash.expect("user has no OTP");
        self.state.db.set_otp(&user.id, &hash, now_ms() - 1).unwrap();
    }

    pub async fn signup(&self, name: &str, email: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/v1/auth/signup",
            None,
            Some(json!({
                "name": name,
                "email": email,
                "password": PASSWORD,
                "passwordConfirm": PASSWORD,
            })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// POST a multipart note from `token` to `receivers`.
    pub async fn send_note(&self, token: &str, receivers: &[Uuid], type_id: i64, title: &str) -> (StatusCode, Value) {
        let boundary = "notecast-test-boundary";
        let receivers = serde_json::to_string(receivers).unwrap();
        let type_id = type_id.to_string();

        let mut body = String::new();
        for (name, value) in [
            ("receiverUserIds", receivers.as_str()),
            ("typeId", type_id.as_str()),
            ("title", title),
            ("message", "see you there"),
        ] {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            ));
        }
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"media\"; filename=\"card.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n",
            boundary
        ));
        body.push_str(&format!("--{}--\r\n", boundary));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/notes")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }
}
