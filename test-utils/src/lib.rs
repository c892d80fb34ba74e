//! `test-utils` is used for testing `vnfetch-lib`.
//! This crate does not depend on `vnfetch-lib`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status to
/// every `GET` request
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("GET")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Mount `templates` on `path` so that they answer one request each, in
/// order. The last template answers every request after that.
#[macro_export]
macro_rules! sequenced_mock {
    ($mock_server:expr, $path:expr, [$($template:expr),+ $(,)?]) => {{
        let templates: Vec<wiremock::ResponseTemplate> = vec![$($template),+];
        let last = templates.len() - 1;
        for (i, template) in templates.into_iter().enumerate() {
            let mock = wiremock::Mock::given(wiremock::matchers::method("GET"))
                .and(wiremock::matchers::path($path))
                .respond_with(template)
                .with_priority(u8::try_from(i + 1).expect("too many templates"));
            let mock = if i == last { mock } else { mock.up_to_n_times(1) };
            mock.mount(&$mock_server).await;
        }
    }};
}

/// Build a `GET` request for `path` on `mock_server`
#[macro_export]
macro_rules! get_request {
    ($mock_server:expr, $path:expr $(,)?) => {{
        let url = format!("{}{}", $mock_server.uri(), $path);
        reqwest::Request::new(
            reqwest::Method::GET,
            reqwest::Url::parse(&url).expect("Expected valid mock server URL"),
        )
    }};
}

/// An `ExecutorConfig` with millisecond delays and a generous rate limit,
/// for tests that talk to a real (mock) server
#[macro_export]
macro_rules! fast_config {
    ($($field:ident : $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut config = ExecutorConfig {
            requests_per_minute: 1000,
            base_delay: std::time::Duration::from_millis(10),
            max_delay: std::time::Duration::from_millis(40),
            jitter: std::time::Duration::ZERO,
            seed: Some(1),
            ..ExecutorConfig::default()
        };
        $(config.$field = $value;)*
        config
    }};
}

/// Get the root path of the project.
#[macro_export]
macro_rules! root_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .to_path_buf()
    };
}

/// Get the path to the `fixtures` directory.
#[macro_export]
macro_rules! fixtures_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .join("fixtures")
    };
}

/// Loads a fixture from the `fixtures` directory
#[macro_export]
macro_rules! load_fixture {
    ($filename:expr) => {{
        let path = $crate::fixtures_path!().join($filename);
        std::fs::read_to_string(path).unwrap()
    }};
}
