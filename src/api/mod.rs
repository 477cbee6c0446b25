//! Rate-limited client for the remote content-platform API
//!
//! All requests go through [`ApiClient::call`], which merges the API key into
//! the query parameters, enforces the sliding-window rate limit, and turns
//! non-2xx responses into typed failures. The higher-level operations are
//! thin payload-shaping wrappers over that primitive; [`ContentApi`] exposes
//! them as a trait so importers can be driven by a fake in tests.

pub mod rate_limit;

pub use rate_limit::{Clock, RateLimiter, SystemClock};

use crate::config::ApiConfig;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Remote API version segment baked into every endpoint URL
pub const API_VERSION: &str = "v1.3";

/// Errors raised by the API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx HTTP response; carries the parsed JSON error body when the
    /// body was valid JSON, else just the status code.
    #[error("remote API returned status {status}")]
    Remote { status: u16, body: Option<Value> },

    /// Connectivity or timeout failure. Never retried by the client;
    /// retry policy, if any, belongs to the caller.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 2xx response whose body could not be interpreted
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),

    /// A caller-supplied payload is missing a mandatory field. Raised
    /// before any HTTP call is made.
    #[error("invalid request payload: {0}")]
    Validation(String),
}

/// Normalized result of an image upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    /// Whether the remote platform detected an animated image
    pub is_animated_gif: bool,
    /// Remote image identifier
    pub image_id: Value,
    /// Embeddable shortcode for the image
    pub shortcode: String,
    /// Identifier of the shortcode itself
    pub shortcode_id: Value,
}

impl UploadedImage {
    fn from_response(response: &Value) -> Result<Self, ApiError> {
        let field = |name: &str| {
            response
                .get(name)
                .cloned()
                .ok_or_else(|| ApiError::InvalidResponse(format!("image response lacks '{name}'")))
        };

        Ok(Self {
            is_animated_gif: field("is_animated_gif")?.as_bool().unwrap_or(false),
            image_id: field("id")?,
            shortcode: field("shortcode")?
                .as_str()
                .ok_or_else(|| ApiError::InvalidResponse("image shortcode is not a string".into()))?
                .to_string(),
            shortcode_id: field("shortcode_id")?,
        })
    }

    /// Serialize the normalized result for persistence
    pub fn to_value(&self) -> Value {
        json!({
            "is_animated_gif": self.is_animated_gif,
            "image_id": self.image_id,
            "shortcode": self.shortcode,
            "shortcode_id": self.shortcode_id,
        })
    }
}

/// High-level operations the importers drive.
///
/// One concrete implementation per deployment target; tests substitute a
/// call-counting fake to verify idempotency and failure isolation.
pub trait ContentApi {
    fn upload_image(
        &mut self,
        image_url: &str,
        caption: &str,
        credit: &str,
        alt: &str,
    ) -> Result<UploadedImage, ApiError>;

    fn get_sections(&mut self) -> Result<Vec<Value>, ApiError>;

    fn create_section(&mut self, title: &str, url: &str) -> Result<Value, ApiError>;

    fn create_author(
        &mut self,
        email: &str,
        name: &str,
        first_name: &str,
        last_name: &str,
        specific_data: Value,
    ) -> Result<Value, ApiError>;

    fn authors_by_name(&mut self, names: &[String]) -> Result<Value, ApiError>;

    fn create_draft(&mut self, draft: &Value) -> Result<Value, ApiError>;

    fn publish_draft(&mut self, draft_id: &str) -> Result<Value, ApiError>;

    fn site_by_name(&mut self, name: &str) -> Result<Value, ApiError>;
}

/// Rate-limited HTTP client for the content platform
pub struct ApiClient<C: Clock = SystemClock> {
    domain: String,
    api_key: String,
    auth: Option<(String, String)>,
    http: Client,
    limiter: RateLimiter<C>,
    verbosity: u8,
}

impl ApiClient<SystemClock> {
    /// Build a client from configuration
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ApiClient<C> {
    /// Build a client with an explicit time source for the rate limiter
    pub fn with_clock(config: &ApiConfig, clock: C) -> Result<Self, ApiError> {
        // Defensive timeout; not part of the observable contract.
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pressport/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let auth = match (&config.http_auth_user, &config.http_auth_pwd) {
            (Some(user), Some(pwd)) => Some((user.clone(), pwd.clone())),
            _ => None,
        };

        Ok(Self {
            domain: config.domain.clone(),
            api_key: config.api_key.clone(),
            auth,
            http,
            limiter: RateLimiter::with_clock(
                config.max_calls,
                Duration::from_secs(config.window_secs),
                clock,
            ),
            verbosity: config.verbosity,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("https://{}/api/{}/{}", self.domain, API_VERSION, path)
    }

    /// Perform one authenticated call against the remote platform.
    ///
    /// The caller's query parameters are copied before the API key is merged
    /// in, so the caller's slice is never mutated.
    pub fn call(
        &mut self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.limiter.acquire();

        let url = self.endpoint(path);
        let mut params: Vec<(String, String)> = query.to_vec();
        params.push(("api_key".to_string(), self.api_key.clone()));

        if self.verbosity >= 1 {
            info!(%method, url, "api request");
        }
        if self.verbosity >= 2 {
            if let Some(body) = body {
                debug!(request_body = %body, "api request body");
            }
        }

        let mut request = self.http.request(method, &url).query(&params);
        if let Some((user, pwd)) = &self.auth {
            request = request.basic_auth(user, Some(pwd));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;

        if self.verbosity >= 1 {
            info!(status = status.as_u16(), "api response");
        }

        classify_response(status.as_u16(), &text, self.verbosity)
    }
}

/// Translate a raw HTTP status and body into the client's result type.
fn classify_response(status: u16, body: &str, verbosity: u8) -> Result<Value, ApiError> {
    if (200..300).contains(&status) {
        if verbosity >= 3 {
            debug!(response_body = %body, "api response body");
        }
        serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("response is not valid JSON: {e}")))
    } else {
        let parsed = serde_json::from_str::<Value>(body).ok();
        if verbosity >= 2 {
            warn!(status, response_body = %body, "api error response");
        }
        Err(ApiError::Remote { status, body: parsed })
    }
}

impl<C: Clock> ContentApi for ApiClient<C> {
    fn upload_image(
        &mut self,
        image_url: &str,
        caption: &str,
        credit: &str,
        alt: &str,
    ) -> Result<UploadedImage, ApiError> {
        let body = json!({
            "image_url": image_url,
            "caption": caption,
            "photo_credit": credit,
            "alt": alt,
        });
        let response = self.call(Method::POST, "images", &[], Some(&body))?;
        UploadedImage::from_response(&response)
    }

    fn get_sections(&mut self) -> Result<Vec<Value>, ApiError> {
        let response = self.call(Method::GET, "sections", &[], None)?;
        response
            .as_array()
            .cloned()
            .ok_or_else(|| ApiError::InvalidResponse("sections response is not an array".into()))
    }

    fn create_section(&mut self, title: &str, url: &str) -> Result<Value, ApiError> {
        let body = json!({ "title": title, "url": url });
        self.call(Method::POST, "sections", &[], Some(&body))
    }

    fn create_author(
        &mut self,
        email: &str,
        name: &str,
        first_name: &str,
        last_name: &str,
        specific_data: Value,
    ) -> Result<Value, ApiError> {
        let body = json!({
            "email": email,
            "name": name,
            "first_name": first_name,
            "last_name": last_name,
            "specific_data": specific_data,
        });
        self.call(Method::POST, "authors", &[], Some(&body))
    }

    fn authors_by_name(&mut self, names: &[String]) -> Result<Value, ApiError> {
        let query = vec![("author_names".to_string(), names.join(","))];
        self.call(Method::GET, "authors/name", &query, None)
    }

    fn create_draft(&mut self, draft: &Value) -> Result<Value, ApiError> {
        let has_headline = draft
            .get("headline")
            .and_then(Value::as_str)
            .map(|h| !h.is_empty())
            .unwrap_or(false);
        if !has_headline {
            return Err(ApiError::Validation(
                "draft payload is missing required field 'headline'".to_string(),
            ));
        }
        self.call(Method::POST, "drafts", &[], Some(draft))
    }

    fn publish_draft(&mut self, draft_id: &str) -> Result<Value, ApiError> {
        let query = vec![("action".to_string(), "publish".to_string())];
        self.call(Method::PUT, &format!("drafts/{draft_id}"), &query, None)
    }

    fn site_by_name(&mut self, name: &str) -> Result<Value, ApiError> {
        let query = vec![("name".to_string(), name.to_string())];
        self.call(Method::GET, "sites", &query, None)
    }
}
