//! # relayhub-adapter-http
//!
//! HTTP adapter: write-only devices that send one request per commanded
//! value. The value's text is the request body unless the device gives a
//! `body` template, in which `{value}` is replaced.
//!
//! ```toml
//! [services.http]
//! timeout_secs = 5
//!
//! # endpoints
//! device = { url = "http://tv.local/volume", method = "PUT" }
//! device = { url = "http://hooks.local/door", method = "POST", headers = { "Content-Type" = "application/json" }, body = '{"open":{value}}' }
//! ```
//!
//! Requests go through `curl`, with arguments passed as argv. Header values
//! (often credentials) are never logged.

use std::collections::BTreeMap;
use std::sync::Arc;

use relayhub_app::ServiceError;
use relayhub_app::exec::{self, ExecError};
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_kernel::value::to_text;
use relayhub_kernel::{BoxError, Connector, Value};
use serde::Deserialize;

/// Registry key of this adapter.
pub const KIND: &str = "http";

/// Placeholder substituted in body templates.
pub const PLACEHOLDER: &str = "{value}";

/// Configuration for the HTTP integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// HTTP client used for requests.
    pub curl: String,
    /// Upper bound on a request, in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            curl: "curl".to_string(),
            timeout_secs: 10,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceSpec {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Option<String>,
}

/// Errors specific to the HTTP adapter.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The method is not an HTTP token.
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    /// The request failed or the server answered with an error status.
    #[error("HTTP request failed")]
    Request(#[source] ExecError),
}

impl From<HttpError> for ServiceError {
    fn from(err: HttpError) -> Self {
        ServiceError::adapter(err)
    }
}

/// A prepared request; only the body depends on the value.
#[derive(Debug)]
struct Request {
    method: String,
    url: String,
    headers: Vec<String>,
    body: Option<String>,
}

impl Request {
    fn from_spec(spec: DeviceSpec) -> Result<Self, HttpError> {
        let method = spec.method.to_ascii_uppercase();
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(HttpError::InvalidMethod(spec.method));
        }
        Ok(Self {
            method,
            url: spec.url,
            headers: spec
                .headers
                .into_iter()
                .map(|(name, value)| format!("{name}: {value}"))
                .collect(),
            body: spec.body,
        })
    }

    fn body_for(&self, value: &Value) -> Option<String> {
        match (&self.body, value) {
            (Some(template), _) => Some(template.replace(PLACEHOLDER, &to_text(value))),
            (None, Value::Null) => None,
            (None, _) => Some(to_text(value)),
        }
    }

    fn args(&self, config: &HttpConfig, value: &Value) -> Vec<String> {
        let mut args = vec![
            "-sS".to_string(),
            "-f".to_string(),
            "--max-time".to_string(),
            config.timeout_secs.to_string(),
            "-X".to_string(),
            self.method.clone(),
        ];
        for header in &self.headers {
            args.push("-H".to_string());
            args.push(header.clone());
        }
        if let Some(body) = self.body_for(value) {
            args.push("--data-binary".to_string());
            args.push(body);
        }
        args.push(self.url.clone());
        args
    }
}

/// Request-per-value integration.
pub struct HttpService {
    name: String,
    config: Arc<HttpConfig>,
}

impl HttpService {
    #[must_use]
    pub fn new(name: impl Into<String>, config: HttpConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: HttpConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    fn connector(&self, spec: DeviceSpec) -> Result<Connector, HttpError> {
        let request = Request::from_spec(spec)?;
        let name = format!("Http<{} {}>", request.method, request.url);
        let config = Arc::clone(&self.config);
        Ok(Connector::with_action(name, move |value: &Value| {
            send(&config, &request, value)
        }))
    }
}

fn send(config: &HttpConfig, request: &Request, value: &Value) -> Result<(), BoxError> {
    tracing::info!(method = %request.method, url = %request.url, value = %to_text(value), "sending HTTP request");
    let response = exec::run(&config.curl, &request.args(config, value)).map_err(HttpError::Request)?;
    tracing::debug!(url = %request.url, response = %response.trim(), "HTTP response");
    Ok(())
}

impl Service for HttpService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        let spec: DeviceSpec = parse_device(&self.name, spec)?;
        Ok(self.connector(spec)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("relayhub-http-{}-{name}", std::process::id()))
    }

    /// An executable standing in for curl that records its arguments, one
    /// per line.
    fn recording_client(name: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let script = temp_path(&format!("{name}.sh"));
        let log = temp_path(&format!("{name}.log"));
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$@\" > {}\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    fn service(curl: &str) -> HttpService {
        HttpService::new(
            "http",
            HttpConfig {
                curl: curl.to_string(),
                ..HttpConfig::default()
            },
        )
    }

    #[test]
    fn should_deserialize_config_from_toml() {
        let config: HttpConfig = toml::from_str("timeout_secs = 3").unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.curl, "curl");
    }

    #[test]
    fn should_send_value_as_body() {
        let (script, log) = recording_client("body");
        let service = service(&script.display().to_string());
        let volume = service
            .device(&json!({
                "url": "http://tv.local/volume",
                "method": "put",
                "headers": { "Authorization": "Bearer secret" },
            }))
            .unwrap();
        assert_eq!(volume.name(), "Http<PUT http://tv.local/volume>");

        volume.command(40);

        let recorded = std::fs::read_to_string(&log).unwrap();
        std::fs::remove_file(&log).unwrap();
        std::fs::remove_file(&script).unwrap();
        assert_eq!(
            recorded.lines().collect::<Vec<_>>(),
            vec![
                "-sS",
                "-f",
                "--max-time",
                "10",
                "-X",
                "PUT",
                "-H",
                "Authorization: Bearer secret",
                "--data-binary",
                "40",
                "http://tv.local/volume",
            ]
        );
    }

    #[test]
    fn should_render_body_template() {
        let request = Request::from_spec(DeviceSpec {
            url: "http://hooks.local/door".to_string(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            body: Some(r#"{"open":{value}}"#.to_string()),
        })
        .unwrap();
        assert_eq!(request.body_for(&json!(true)).as_deref(), Some(r#"{"open":true}"#));
        assert_eq!(request.body_for(&json!(null)).as_deref(), Some(r#"{"open":null}"#));
    }

    #[test]
    fn should_omit_body_for_null_without_template() {
        let request = Request::from_spec(DeviceSpec {
            url: "http://hooks.local/ping".to_string(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        })
        .unwrap();
        assert_eq!(request.body_for(&json!(null)), None);
        assert_eq!(request.body_for(&json!("on")).as_deref(), Some("on"));
        assert!(!request.args(&HttpConfig::default(), &json!(null)).contains(&"--data-binary".to_string()));
    }

    #[test]
    fn should_keep_value_when_request_fails() {
        let service = service("false");
        let hook = service.device(&json!({ "url": "http://hooks.local/door" })).unwrap();
        hook.command("open");
        assert_eq!(hook.get(), Some(json!("open")));
    }

    #[test]
    fn should_reject_invalid_method() {
        let service = service("true");
        assert!(matches!(
            service.device(&json!({ "url": "http://x", "method": "GET /etc" })),
            Err(ServiceError::Adapter(_))
        ));
    }

    #[test]
    fn should_reject_malformed_device_spec() {
        let service = service("true");
        assert!(matches!(
            service.device(&json!({ "uri": "http://x" })),
            Err(ServiceError::Device { .. })
        ));
    }
}
