//! An HTTP client composed from an [`Executor`] and a [`Transport`].
//!
//! Every attempt clones the caller's request, dresses it with the drawn
//! identity profile and the configured headers, and sends it through the
//! transport. Non-success statuses become [`Fault::Status`] so the default
//! [`HttpClassifier`] can decide whether to retry.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Request, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use typed_builder::TypedBuilder;

use crate::cancel::Cancellation;
use crate::classify::{Fault, HttpClassifier};
use crate::retry::{Attempt, Execution, Executor};
use crate::{ErrorKind, ExecutorConfig, Result};

/// Default timeout for a single request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one request and returns the raw response
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Send `request`
    async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
        self.execute(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
        (**self).send(request).await
    }
}

/// Builder for [`Client`].
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Rate, retry and identity settings for the executor.
    ///
    /// Ignored if an `executor` is given.
    config: ExecutorConfig,

    /// Share an existing executor, and with it the rate budget, instead of
    /// creating one from `config`.
    executor: Option<Arc<Executor>>,

    /// Timeout for a single request.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,

    /// Headers sent with every request, e.g. `Referer` and `Origin` of the
    /// site the endpoint belongs to.
    default_headers: HeaderMap,

    /// Credentials sent with every request, e.g. an API key header.
    ///
    /// The values are marked as sensitive so they do not show up in debug
    /// output. They should come from the environment or a secrets store.
    secret_headers: Vec<(HeaderName, SecretString)>,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`] backed by a `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The configuration is invalid.
    /// - A secret header value is not a valid header value.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .timeout(self.timeout)
            .build()
            .map_err(ErrorKind::BuildClient)?;

        self.client_with(reqwest_client)
    }

    /// Instantiates a [`Client`] sending through `transport`.
    ///
    /// The `timeout` setting is up to the transport.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the configuration is invalid or a secret header
    /// value is not a valid header value.
    pub fn client_with<T: Transport>(self, transport: T) -> Result<Client<T>> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(Executor::new(&self.config)?),
        };

        let mut secret_headers = HeaderMap::new();
        for (name, secret) in self.secret_headers {
            let mut value = HeaderValue::from_str(secret.expose_secret())?;
            value.set_sensitive(true);
            secret_headers.insert(name, value);
        }

        Ok(Client {
            executor,
            transport,
            default_headers: self.default_headers,
            secret_headers,
        })
    }
}

/// Sends requests through the retry executor.
///
/// Headers are layered per attempt, later layers winning: the identity
/// profile, the default headers, the headers of the request itself, and
/// the secret headers.
#[derive(Debug, Clone)]
pub struct Client<T = reqwest::Client> {
    executor: Arc<Executor>,
    transport: T,
    default_headers: HeaderMap,
    secret_headers: HeaderMap,
}

impl<T: Transport> Client<T> {
    /// The executor driving this client
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// A handle on the executor, for sharing its rate budget with other clients
    #[must_use]
    pub fn shared_executor(&self) -> Arc<Executor> {
        Arc::clone(&self.executor)
    }

    /// Build the request for one attempt
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Other`] if the request has a streaming body that
    /// cannot be cloned.
    pub fn prepare(&self, request: &Request, attempt: &Attempt) -> std::result::Result<Request, Fault> {
        let mut prepared = request
            .try_clone()
            .ok_or_else(|| Fault::Other("request body cannot be cloned for retries".into()))?;

        let mut headers = HeaderMap::new();
        attempt.profile.apply(&mut headers);
        overlay(&mut headers, &self.default_headers);
        overlay(&mut headers, request.headers());
        overlay(&mut headers, &self.secret_headers);
        *prepared.headers_mut() = headers;

        Ok(prepared)
    }

    /// Make a single attempt, for use inside a [`crate::Strategy`]
    ///
    /// # Errors
    ///
    /// Returns a [`Fault`] if the request fails or the status is not a success.
    pub async fn attempt(
        &self,
        request: &Request,
        attempt: &Attempt,
    ) -> std::result::Result<Response, Fault> {
        let prepared = self.prepare(request, attempt)?;
        log::debug!("{} {} as {}", prepared.method(), prepared.url(), attempt.profile.name);

        let response = self.transport.send(prepared).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Fault::from_response(&response))
        }
    }

    /// Make a single attempt and decode the JSON body
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Decode`] if the body is not valid JSON for `D`, and
    /// everything [`Client::attempt`] returns.
    pub async fn attempt_json<D: DeserializeOwned>(
        &self,
        request: &Request,
        attempt: &Attempt,
    ) -> std::result::Result<D, Fault> {
        let body = self.attempt(request, attempt).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| Fault::Decode(e.to_string()))
    }

    /// Send `request`, retrying according to the executor's policy
    pub async fn send(&self, request: Request) -> Execution<std::result::Result<Response, Fault>> {
        self.send_with(request, &Cancellation::none()).await
    }

    /// Like [`Client::send`], aborting when `cancel` fires
    pub async fn send_with(
        &self,
        request: Request,
        cancel: &Cancellation,
    ) -> Execution<std::result::Result<Response, Fault>> {
        let request = &request;
        self.executor
            .execute_with(
                move |attempt| async move { self.attempt(request, &attempt).await },
                HttpClassifier::default(),
                self.executor.policy(),
                cancel,
            )
            .await
    }

    /// Send `request` and decode the JSON body. An undecodable body is retried.
    pub async fn fetch_json<D: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Execution<std::result::Result<D, Fault>> {
        self.fetch_json_with(request, &Cancellation::none()).await
    }

    /// Like [`Client::fetch_json`], aborting when `cancel` fires
    pub async fn fetch_json_with<D: DeserializeOwned>(
        &self,
        request: Request,
        cancel: &Cancellation,
    ) -> Execution<std::result::Result<D, Fault>> {
        let request = &request;
        self.executor
            .execute_with(
                move |attempt| async move { self.attempt_json(request, &attempt).await },
                HttpClassifier::default(),
                self.executor.policy(),
                cancel,
            )
            .await
    }
}

/// Replace every header named in `layer` with all of `layer`'s values for it
fn overlay(headers: &mut HeaderMap, layer: &HeaderMap) {
    for name in layer.keys() {
        headers.remove(name);
        for value in layer.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use http::{Method, StatusCode, header};
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;
    use crate::{Classification, IdentityProfile};

    /// Answers with scripted status codes and records the requests it saw
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<(u16, &'static str)>>,
        seen: Mutex<Vec<HeaderMap>>,
    }

    impl ScriptedTransport {
        fn new(responses: &[(u16, &'static str)]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().copied().collect()),
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
            self.seen.lock().unwrap().push(request.headers().clone());
            let (status, body) = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((200, "{}"));
            let response = http::Response::builder().status(status).body(body).unwrap();
            Ok(Response::from(response))
        }
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            requests_per_minute: 600,
            max_attempts: 3,
            jitter: Duration::ZERO,
            random_agent: false,
            seed: Some(1),
            profiles: vec![IdentityProfile::new(
                "test-agent",
                HeaderValue::from_static("vnfetch-test/1.0"),
            )
            .with_header(header::ACCEPT, HeaderValue::from_static("application/json"))],
            ..ExecutorConfig::default()
        }
    }

    fn request() -> Request {
        Request::new(Method::GET, Url::parse("https://example.com/api/nav").unwrap())
    }

    #[test]
    fn test_default_builder() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.timeout, DEFAULT_TIMEOUT);
        assert!(builder.secret_headers.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = ClientBuilder::builder()
            .config(ExecutorConfig {
                max_attempts: 0,
                ..config()
            })
            .build()
            .client();
        assert!(matches!(result, Err(ErrorKind::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_layers() {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::REFERER, HeaderValue::from_static("https://example.com/"));
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let transport = ScriptedTransport::new(&[]);
        let client = ClientBuilder::builder()
            .config(config())
            .default_headers(default_headers)
            .secret_headers(vec![(
                HeaderName::from_static("x-api-key"),
                SecretString::from("hunter2".to_owned()),
            )])
            .build()
            .client_with(Arc::clone(&transport))
            .unwrap();

        let mut request = request();
        request
            .headers_mut()
            .insert(header::ACCEPT, HeaderValue::from_static("text/csv"));

        let execution = client.send(request).await;
        assert!(execution.is_success());

        let seen = transport.seen.lock().unwrap();
        let headers = &seen[0];
        assert_eq!(headers[header::USER_AGENT], "vnfetch-test/1.0");
        assert_eq!(headers[header::REFERER], "https://example.com/");
        assert_eq!(headers[header::ACCEPT], "text/csv");
        assert_eq!(headers["x-api-key"], "hunter2");
        assert!(headers["x-api-key"].is_sensitive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_headers_keep_every_value() {
        let mut default_headers = HeaderMap::new();
        default_headers.append(header::ACCEPT, HeaderValue::from_static("text/html"));
        default_headers.append(header::ACCEPT, HeaderValue::from_static("application/xml"));
        default_headers.insert(header::COOKIE, HeaderValue::from_static("session=default"));

        let transport = ScriptedTransport::new(&[]);
        let client = ClientBuilder::builder()
            .config(config())
            .default_headers(default_headers)
            .build()
            .client_with(Arc::clone(&transport))
            .unwrap();

        let mut request = request();
        request
            .headers_mut()
            .append(header::COOKIE, HeaderValue::from_static("a=1"));
        request
            .headers_mut()
            .append(header::COOKIE, HeaderValue::from_static("b=2"));

        let execution = client.send(request).await;
        assert!(execution.is_success());

        let seen = transport.seen.lock().unwrap();
        let values = |name: HeaderName| {
            seen[0]
                .get_all(name)
                .iter()
                .map(|v| v.to_str().unwrap().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(values(header::COOKIE), ["a=1", "b=2"]);
        assert_eq!(values(header::ACCEPT), ["text/html", "application/xml"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_secret_not_in_debug_output() {
        let client = ClientBuilder::builder()
            .config(config())
            .secret_headers(vec![(
                HeaderName::from_static("x-api-key"),
                SecretString::from("hunter2".to_owned()),
            )])
            .build()
            .client_with(ScriptedTransport::new(&[]))
            .unwrap();

        assert!(!format!("{client:?}").contains("hunter2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors() {
        let transport = ScriptedTransport::new(&[(503, ""), (502, ""), (200, "{}")]);
        let client = ClientBuilder::builder()
            .config(config())
            .build()
            .client_with(Arc::clone(&transport))
            .unwrap();

        let execution = client.send(request()).await;

        assert_eq!(execution.attempts(), 3);
        let response = execution.into_result().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_permanent() {
        let transport = ScriptedTransport::new(&[(404, "")]);
        let client = ClientBuilder::builder()
            .config(config())
            .build()
            .client_with(Arc::clone(&transport))
            .unwrap();

        let execution = client.send(request()).await;

        assert!(matches!(
            execution,
            Execution::PermanentFailure { attempts: 1, .. }
        ));
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_body_is_retried() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Nav {
            nav: f64,
        }

        let transport = ScriptedTransport::new(&[(200, "<html>"), (200, r#"{"nav": 12.5}"#)]);
        let client = ClientBuilder::builder()
            .config(config())
            .build()
            .client_with(Arc::clone(&transport))
            .unwrap();

        let execution = client.fetch_json::<Nav>(request()).await;

        assert_eq!(execution.attempts(), 2);
        assert_eq!(execution.into_result().unwrap(), Nav { nav: 12.5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_keeps_fault() {
        let transport = ScriptedTransport::new(&[(500, ""), (500, ""), (500, "")]);
        let client = ClientBuilder::builder()
            .config(config())
            .build()
            .client_with(transport)
            .unwrap();

        let error = client.send(request()).await.into_result().unwrap_err();

        assert!(matches!(
            error,
            ErrorKind::BudgetExhausted {
                attempts: 3,
                last: Classification::RetryableTransient,
                ..
            }
        ));
        assert_eq!(
            error.fault().and_then(Fault::status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_executor() {
        let first = ClientBuilder::builder()
            .config(config())
            .build()
            .client_with(ScriptedTransport::new(&[]))
            .unwrap();
        let second = ClientBuilder::builder()
            .executor(first.shared_executor())
            .build()
            .client_with(ScriptedTransport::new(&[]))
            .unwrap();

        let _ = first.send(request()).await;
        let _ = second.send(request()).await;

        assert_eq!(first.executor().stats().total_attempts, 2);
        assert_eq!(first.executor().limiter().in_window().await, 2);
    }
}
