//! Mock identity provider and STS for auth tests.

use axum::{Form, Json, Router, http::StatusCode, routing::post};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use wifassist_config::Config;

pub(crate) type Forms = Arc<Mutex<Vec<HashMap<String, String>>>>;

pub(crate) const TENANT: &str = "contoso";

/// Authorization codes the mock token endpoint rejects.
pub(crate) const BAD_CODE: &str = "expired-code";
/// Access token the mock STS refuses to exchange.
pub(crate) const REJECTED_SUBJECT: &str = "rejected-subject";

pub(crate) struct MockServer {
    pub base: String,
    pub token_forms: Forms,
    pub sts_forms: Forms,
}

impl MockServer {
    pub fn sts_url(&self) -> String {
        format!("{}/v1/token", self.base)
    }

    pub fn token_calls(&self) -> usize {
        self.token_forms.lock().unwrap().len()
    }

    pub fn sts_calls(&self) -> usize {
        self.sts_forms.lock().unwrap().len()
    }

    pub fn last_token_form(&self) -> HashMap<String, String> {
        self.token_forms.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_sts_form(&self) -> HashMap<String, String> {
        self.sts_forms.lock().unwrap().last().cloned().unwrap()
    }

    /// A complete configuration pointing at this server.
    pub fn config(&self) -> Config {
        let mut config = Config::from_yaml(&format!(
            r#"
app_name: weather_app
user_id: user1
federation:
  tenant_id: "{TENANT}"
  client_id: "app-123"
  client_secret: "s3cret"
  pool_id: "pool-1"
  provider_id: "entra"
  project_number: "123456"
  authority: "{base}"
  sts_url: "{sts}"
assistant:
  project_id: "proj"
  engine_id: "engine-1"
"#,
            base = self.base,
            sts = self.sts_url(),
        ))
        .unwrap();
        config.callback.port = 0;
        config
    }
}

fn error_body(error: &str, description: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error, "error_description": description})),
    )
}

pub(crate) async fn mock_server() -> MockServer {
    let token_forms: Forms = Arc::default();
    let sts_forms: Forms = Arc::default();

    let tf = Arc::clone(&token_forms);
    let sf = Arc::clone(&sts_forms);
    let app = Router::new()
        .route(
            &format!("/{TENANT}/oauth2/v2.0/token"),
            post(move |Form(form): Form<HashMap<String, String>>| {
                let tf = Arc::clone(&tf);
                async move {
                    let code = form.get("code").cloned().unwrap_or_default();
                    tf.lock().unwrap().push(form);
                    match code.as_str() {
                        BAD_CODE => error_body("invalid_grant", "AADSTS70008: code expired"),
                        "no-access-token" => (StatusCode::OK, Json(json!({"id_token": "x"}))),
                        "reject-at-sts" => (
                            StatusCode::OK,
                            Json(json!({"access_token": REJECTED_SUBJECT})),
                        ),
                        _ => (
                            StatusCode::OK,
                            Json(json!({
                                "access_token": "entra-access",
                                "id_token": "entra-id",
                                "token_type": "Bearer",
                                "expires_in": 3599
                            })),
                        ),
                    }
                }
            }),
        )
        .route(
            "/v1/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let sf = Arc::clone(&sf);
                async move {
                    let subject = form.get("subject_token").cloned().unwrap_or_default();
                    let n = {
                        let mut forms = sf.lock().unwrap();
                        forms.push(form);
                        forms.len()
                    };
                    if subject == REJECTED_SUBJECT {
                        return error_body("invalid_grant", "subject token audience mismatch");
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "access_token": format!("ya29.federated-{n}"),
                            "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
                            "token_type": "Bearer",
                            "expires_in": 3600
                        })),
                    )
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockServer {
        base: format!("http://{addr}"),
        token_forms,
        sts_forms,
    }
}
