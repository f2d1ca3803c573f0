//! Cookie-jar HTTP sessions for supplier catalogues.
//!
//! Each pooled session owns its own [`reqwest::Client`] with a cookie
//! store and a User-Agent picked from a rotation list. Sanitising a
//! session rebuilds the client, which drops every cookie the catalogue
//! set and picks a fresh User-Agent.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SearchError, SessionError, SourceError};
use crate::pool::SessionBackend;

/// Realistic browser User-Agent strings, rotated per session.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// HTTP client settings shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Fixed User-Agent; rotates through built-in browsers when absent.
    pub user_agent: Option<String>,
    /// Redirects followed per request.
    pub max_redirects: usize,
    /// `Accept-Language` header sent with every request.
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: None,
            max_redirects: 10,
            accept_language: "ru-RU,ru;q=0.9,en;q=0.5".into(),
        }
    }
}

impl HttpConfig {
    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.timeout_secs == 0 {
            return Err(SearchError::Config(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// One browser-like HTTP session.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    user_agent: String,
    accept_language: String,
}

impl HttpSession {
    /// User-Agent this session presents.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET `url` and return the body as text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Request`] on transport failure or a non-2xx
    /// status.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, &self.accept_language)
            .send()
            .await
            .map_err(|e| SourceError::Request(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| SourceError::Request(format!("HTTP error from {url}: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Request(format!("reading {url} failed: {e}")))?;
        tracing::trace!(bytes = body.len(), "page received");
        Ok(body)
    }
}

/// Creates and sanitises [`HttpSession`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpSessionBackend {
    config: HttpConfig,
}

impl HttpSessionBackend {
    /// Backend producing sessions with `config`.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    fn build_session(&self) -> Result<HttpSession, String> {
        let user_agent = match &self.config.user_agent {
            Some(custom) => custom.clone(),
            None => random_user_agent().to_owned(),
        };
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .user_agent(user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(self.config.max_redirects))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(HttpSession {
            client,
            user_agent,
            accept_language: self.config.accept_language.clone(),
        })
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    type Session = HttpSession;

    async fn create(&self) -> Result<HttpSession, SessionError> {
        self.build_session().map_err(SessionError::Create)
    }

    async fn sanitize(&self, session: &mut HttpSession) -> Result<(), SessionError> {
        // The old client still works if a fresh one cannot be built; it
        // just keeps its cookies.
        *session = self.build_session().map_err(SessionError::Sanitize)?;
        Ok(())
    }
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn random_user_agent_is_from_list() {
        let ua = random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = HttpConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(HttpConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn custom_user_agent_is_used() {
        let backend = HttpSessionBackend::new(HttpConfig {
            user_agent: Some("ProcuraTest/1.0".into()),
            ..Default::default()
        });
        let session = backend.create().await.expect("session");
        assert_eq!(session.user_agent(), "ProcuraTest/1.0");
    }

    #[tokio::test]
    async fn get_text_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = HttpSessionBackend::default()
            .create()
            .await
            .expect("session");
        let err = session
            .get_text(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Request(_)));
    }

    #[tokio::test]
    async fn sanitize_drops_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/whoami"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("known"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/whoami"))
            .respond_with(ResponseTemplate::new(200).set_body_string("anonymous"))
            .mount(&server)
            .await;

        let backend = HttpSessionBackend::default();
        let mut session = backend.create().await.expect("session");
        session
            .get_text(&format!("{}/login", server.uri()))
            .await
            .expect("login");
        let before = session
            .get_text(&format!("{}/whoami", server.uri()))
            .await
            .expect("whoami");
        assert_eq!(before, "known");

        backend.sanitize(&mut session).await.expect("sanitize");
        let after = session
            .get_text(&format!("{}/whoami", server.uri()))
            .await
            .expect("whoami");
        assert_eq!(after, "anonymous");
    }
}
