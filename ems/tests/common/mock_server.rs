use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ems::token::{MemoryStore, SessionTokens};
use ems::{ClientSettings, EmsClient, Endpoints, ExecutionContext, Mode, Session};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta")]
    pub meta: Option<FixtureMeta>,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize)]
pub struct FixtureMeta {
    pub query: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path_pattern: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    /// JSON body, sent as `application/json`
    pub body: Option<serde_json::Value>,
    /// Plain-text body, sent as `text/plain`
    pub text: Option<String>,
}

/// Both stores of one session, for asserting what an operation left behind.
pub struct Stores {
    pub server: Arc<MemoryStore>,
    pub client: Arc<MemoryStore>,
}

pub struct EmsMock {
    pub server: MockServer,
}

impl EmsMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::builder().start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    pub async fn mount_fixture(&self, fixture_path: &str) {
        let full_path = Self::fixtures_dir().join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        let fixture: Fixture = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e));

        let mut mock = Mock::given(method(fixture.request.method.as_str()))
            .and(path_regex(&fixture.request.path_pattern));

        if let Some(query) = fixture.meta.and_then(|meta| meta.query) {
            for (key, value) in query {
                mock = mock.and(query_param(key, value));
            }
        }

        let mut response = ResponseTemplate::new(fixture.response.status_code);
        if let Some(body) = &fixture.response.body {
            response = response.set_body_json(body);
        } else if let Some(text) = fixture.response.text {
            response = response.set_body_string(text);
        }

        mock.respond_with(response).mount(&self.server).await;
    }

    pub fn settings(&self) -> ClientSettings {
        ClientSettings {
            endpoints: Endpoints::new(self.server.uri(), self.server.uri()),
            mode: Mode::Development,
            ..ClientSettings::default()
        }
    }

    pub fn client(&self) -> EmsClient {
        EmsClient::new(self.settings(), ExecutionContext::Server)
    }

    /// A server-context session over two in-memory stores, both holding `token`.
    pub fn session(&self, token: Option<&str>) -> (Session, Stores) {
        let stores = Stores {
            server: Arc::new(token.map_or_else(MemoryStore::new, MemoryStore::with_token)),
            client: Arc::new(token.map_or_else(MemoryStore::new, MemoryStore::with_token)),
        };
        let tokens = SessionTokens::new(ExecutionContext::Server)
            .with_server_store(stores.server.clone())
            .with_client_store(stores.client.clone());
        (Session::new(&self.client(), tokens), stores)
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

/// An unsigned token whose payload carries `sub` and `role`.
pub fn token_for(sub: &str, role: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({ "sub": sub, "role": role, "exp": 4_102_444_800_i64 });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{payload}.sig")
}
