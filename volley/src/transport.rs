//! The boundary between the driver and the system under test.
//!
//! The driver never speaks HTTP itself: a [`Transport`] turns a [`RequestSpec`]
//! into a [`Response`] (or a [`TransportError`]). Connection pooling, retries and
//! TLS all belong to the transport.
use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{error::TransportError, request::RequestSpec};

/// What came back from the system under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests on behalf of the virtual users.
///
/// One transport instance is shared by every worker, so it must be `Send + Sync`.
///
/// # Example
/// ```rust
/// use volley::{RequestSpec, Response, Transport, TransportError};
///
/// struct AlwaysOk;
///
/// impl Transport for AlwaysOk {
///     async fn send(&self, _: &RequestSpec) -> Result<Response, TransportError> {
///         Ok(Response::new(200))
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &RequestSpec,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

#[cfg(feature = "http")]
pub use http_transport::HttpTransport;

#[cfg(feature = "http")]
mod http_transport {
    use std::time::Duration;

    use reqwest::header::COOKIE;
    use typed_builder::TypedBuilder;

    use super::*;

    /// [`Transport`] backed by a shared [`reqwest::Client`].
    ///
    /// Build the client once and hand it over; the client keeps its own
    /// connection pool shared by every virtual user.
    #[derive(Debug, Clone, Default, TypedBuilder)]
    pub struct HttpTransport {
        #[builder(default)]
        client: reqwest::Client,
        /// Per-request timeout. Without one the client's own settings apply.
        #[builder(default, setter(strip_option))]
        timeout: Option<Duration>,
    }

    impl HttpTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self {
                client,
                timeout: None,
            }
        }

        fn map_error(&self, e: reqwest::Error) -> TransportError {
            if e.is_timeout() {
                self.timeout
                    .map_or(TransportError::ClientTimeout, TransportError::Timeout)
            } else if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else if e.is_decode() || e.is_body() {
                TransportError::Malformed(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        }
    }

    impl Transport for HttpTransport {
        async fn send(&self, request: &RequestSpec) -> Result<Response, TransportError> {
            let mut builder = self
                .client
                .request(request.method().clone(), request.url());

            for (name, value) in request.headers() {
                builder = builder.header(name, value);
            }
            if let Some(cookies) = request.cookie_header() {
                builder = builder.header(COOKIE, cookies);
            }
            if let Some(body) = request.body() {
                builder = builder.body(body.clone());
            }
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let res = builder.send().await.map_err(|e| self.map_error(e))?;

            let status = res.status().as_u16();
            let headers = res
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = res.bytes().await.map_err(|e| self.map_error(e))?;

            Ok(Response {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_parses() {
        let res = Response::new(200).with_body(r#"{"count": 3}"#);
        let value: serde_json::Value = res.json().unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let res = Response::new(200).with_body("<html>");
        assert!(res.json::<serde_json::Value>().is_err());
        assert_eq!(res.text(), "<html>");
    }

    #[cfg(feature = "http")]
    mod over_http {
        use std::{net::TcpListener, time::Duration};

        use super::*;

        /// Accepts connections (through the backlog) but never answers.
        fn silent_server() -> (TcpListener, String) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}/", listener.local_addr().unwrap());
            (listener, url)
        }

        #[tokio::test]
        async fn own_timeout_is_reported_with_its_length() {
            let (_listener, url) = silent_server();
            let transport = HttpTransport::builder()
                .timeout(Duration::from_millis(50))
                .build();

            let err = transport.send(&RequestSpec::get(url)).await.unwrap_err();
            assert!(
                matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(50)),
                "{err:?}"
            );
        }

        #[tokio::test]
        async fn client_timeout_has_no_length() {
            let (_listener, url) = silent_server();
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(50))
                .build()
                .unwrap();

            let err = HttpTransport::new(client)
                .send(&RequestSpec::get(url))
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::ClientTimeout), "{err:?}");
            assert_eq!(err.to_string(), "timed out waiting for response");
        }
    }
}
