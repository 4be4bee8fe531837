use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE,
};
use reqwest::{Method, Response};
use serde_json::Value;
use url::Url;

use crate::{ApiError, EmsClient, Error, GENERIC_FAILURE};

/// Method, body, credentials and extra headers of one backend call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    method: Method,
    body: Option<Value>,
    token: Option<String>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            token: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
        }
    }

    /// Sends `body` as JSON.
    ///
    /// # Errors
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn with_json<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Authenticates the call with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Adds a header applied after the defaults, replacing a default of the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if let Some(token) = &self.token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }
        for name in self.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

impl EmsClient {
    /// Performs one call against the backend of the current execution context.
    ///
    /// The base URL is resolved on every call. Non-2xx responses become
    /// [`Error::Api`]; a 2xx body that does not fit `T` becomes [`Error::Decode`].
    ///
    /// # Errors
    /// Returns an error if the request cannot be built or sent, if the backend
    /// answers with a non-2xx status, or if the body does not deserialize into `T`.
    pub async fn request<T>(&self, path: &str, options: RequestOptions) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.resolve_url(path)?;
        let headers = options.headers()?;
        let RequestOptions {
            method, body, query, ..
        } = options;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers);
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(&body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%method, %url, status = status.as_u16(), "backend call");

        if !status.is_success() {
            let body = parse_body(response).await.ok();
            return Err(api_error(status, body).into());
        }

        let body = parse_body(response).await?;
        serde_json::from_value(body).map_err(Error::from)
    }

    fn resolve_url(&self, path: &str) -> Result<Url, Error> {
        let base = self
            .settings
            .endpoints
            .resolve(self.context, self.settings.mode);
        Url::parse(base)
            .and_then(|base| base.join(path))
            .map_err(|source| Error::InvalidUrl {
                path: path.to_string(),
                source,
            })
    }
}

/// JSON bodies are parsed; anything else is wrapped as `{"message": text}`,
/// or `{}` when empty.
async fn parse_body(response: Response) -> Result<Value, reqwest::Error> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));
    if is_json {
        return response.json().await;
    }

    let text = response.text().await?;
    if text.is_empty() {
        Ok(Value::Object(serde_json::Map::new()))
    } else {
        Ok(serde_json::json!({ "message": text }))
    }
}

fn api_error(status: reqwest::StatusCode, body: Option<Value>) -> ApiError {
    let message = body
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(Value::as_str)
        .or_else(|| status.canonical_reason())
        .unwrap_or(GENERIC_FAILURE)
        .to_string();
    ApiError {
        status: status.as_u16(),
        message,
        body,
    }
}
