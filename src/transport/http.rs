use super::{check_status, request_target, Connection, Connector};
use crate::auth::Authenticator;
use crate::error::{ConfigError, StreamError};
use crate::registry::CameraDescriptor;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("alarmstream/", env!("CARGO_PKG_VERSION"));

/// Opens conformant multipart alert streams over HTTP or HTTPS.
///
/// The underlying `reqwest::Client` pools connections and is shared by every camera.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn builder() -> HttpConnectorBuilder {
        HttpConnectorBuilder::default()
    }

    async fn send(
        &self,
        camera: &CameraDescriptor,
        authorization: Option<&str>,
    ) -> Result<Response, StreamError> {
        let mut request = self.client.get(camera.stream_url().clone());
        if let Some(value) = authorization {
            let value = HeaderValue::from_str(value).map_err(|e| {
                StreamError::connection(format!("invalid authorization header: {e}"))
            })?;
            request = request.header(AUTHORIZATION, value);
        }
        Ok(request.send().await?)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, camera: &CameraDescriptor) -> Result<Connection, StreamError> {
        let auth = Authenticator::for_camera(camera);
        let mut response = self.send(camera, auth.preemptive_header().as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && auth.answers_challenges() {
            let challenges: Vec<String> = response
                .headers()
                .get_all(WWW_AUTHENTICATE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_string)
                .collect();
            debug!(
                target: "alarmstream::transport",
                camera = %camera.name(),
                challenges = challenges.len(),
                "answering digest challenge"
            );
            let header = auth.answer_challenge(
                challenges.iter().map(String::as_str),
                "GET",
                &request_target(camera.stream_url()),
            )?;
            drop(response);
            response = self.send(camera, Some(&header)).await?;
        }

        check_status(response.status().as_u16())?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes_stream().map(|chunk| chunk.map_err(StreamError::from)).boxed();
        Ok(Connection::new(content_type, body))
    }
}

/// Builder for [`HttpConnector`].
#[derive(Debug, Clone)]
pub struct HttpConnectorBuilder {
    accept_invalid_certs: bool,
    connect_timeout: Duration,
    user_agent: String,
}

impl Default for HttpConnectorBuilder {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConnectorBuilder {
    /// Accept self-signed camera certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// TCP/TLS connect timeout. The stream itself has no read timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<HttpConnector, ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::HttpClient("connect_timeout must be > 0".into()));
        }
        let client = Client::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(HttpConnector { client })
    }
}
