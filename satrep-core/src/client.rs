use std::fs;
use std::time::Duration;

use anyhow::{Context as _, Result};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use satrep_sdk::{ApiError, InventoryClient, Query};
use serde_json::Value;
use url::Url;

use crate::config::Config;

/// Inventory client speaking to a live server over HTTPS with basic auth.
pub struct HttpInventoryClient {
    base: Url,
    username: String,
    password: Option<String>,
    timeout_secs: u64,
    client: Client,
}

impl HttpInventoryClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("satrep/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.ca_cert {
            let pem = fs::read(path)
                .with_context(|| format!("failed to read CA bundle {}", path.display()))?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("invalid CA bundle {}", path.display()))?;
            builder = builder.add_root_certificate(certificate);
        }

        if config.insecure {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("failed to create HTTP client")?;

        Ok(Self {
            base: config.base_url()?,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

impl InventoryClient for HttpInventoryClient {
    fn get_json(&self, query: &Query) -> Result<Value, ApiError> {
        let url = query.to_url(&self.base).map_err(|err| ApiError::Transport {
            url: query.to_string(),
            message: err.to_string(),
        })?;
        let location = url.to_string();
        tracing::debug!(url = %location, "GET");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .basic_auth(&self.username, self.password.as_deref())
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    ApiError::Timeout {
                        url: location.clone(),
                        seconds: self.timeout_secs,
                    }
                } else {
                    ApiError::Transport {
                        url: location.clone(),
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().map_err(|err| ApiError::Transport {
            url: location.clone(),
            message: err.to_string(),
        })?;

        let parsed = serde_json::from_str::<Value>(&text);
        if !status.is_success() {
            // Error payloads are interpreted by the caller.
            return match parsed {
                Ok(body) if body.get("error").is_some() => Ok(body),
                _ => Err(ApiError::Transport {
                    url: location,
                    message: format!("HTTP {}", status),
                }),
            };
        }

        parsed.map_err(|err| ApiError::Decode {
            url: location,
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answers one request on a local port with `status` and `body`, after `delay`.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> Config {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        });

        Config {
            server: format!("http://{}", address),
            timeout_secs: 1,
            ..Config::default()
        }
    }

    fn client_for(config: &Config) -> HttpInventoryClient {
        HttpInventoryClient::new(config).unwrap()
    }

    #[test]
    fn success_body_is_decoded() {
        let config = serve_once(
            "200 OK",
            r#"{"total": 1, "results": [{"name": "web01"}]}"#,
            Duration::ZERO,
        );
        let names = client_for(&config)
            .list_field(&Query::foreman("hosts"), "name")
            .unwrap();
        assert_eq!(names, vec!["web01"]);
    }

    #[test]
    fn error_payload_reaches_the_caller() {
        let config = serve_once(
            "401 Unauthorized",
            r#"{"error": {"message": "Unable to authenticate user admin"}}"#,
            Duration::ZERO,
        );
        let client = client_for(&config);
        let body = client.get_json(&Query::foreman("hosts")).unwrap();
        assert_eq!(
            body["error"]["message"],
            json!("Unable to authenticate user admin")
        );

        let config = serve_once(
            "401 Unauthorized",
            r#"{"error": {"message": "Unable to authenticate user admin"}}"#,
            Duration::ZERO,
        );
        assert_eq!(
            client_for(&config)
                .fetch_page(&Query::foreman("hosts"))
                .unwrap_err(),
            ApiError::Api("Unable to authenticate user admin".into())
        );
    }

    #[test]
    fn server_error_page_is_a_transport_error() {
        let config = serve_once(
            "500 Internal Server Error",
            "<html><body>Internal Server Error</body></html>",
            Duration::ZERO,
        );
        let err = client_for(&config)
            .get_json(&Query::foreman("hosts"))
            .unwrap_err();
        match err {
            ApiError::Transport { url, message } => {
                assert!(url.ends_with("/api/v2/hosts"));
                assert!(message.contains("500"));
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[test]
    fn garbled_success_body_is_a_decode_error() {
        let config = serve_once("200 OK", "not json", Duration::ZERO);
        let err = client_for(&config)
            .get_json(&Query::foreman("domains"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[test]
    fn slow_server_times_out() {
        let config = serve_once("200 OK", "{}", Duration::from_secs(3));
        let err = client_for(&config)
            .get_json(&Query::foreman("hosts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout { seconds: 1, .. }));
    }

    #[test]
    fn client_uses_configured_base() {
        let config = Config {
            server: "satellite.example.com".into(),
            ..Config::default()
        };
        let client = HttpInventoryClient::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "https://satellite.example.com/");
    }

    #[test]
    fn missing_ca_bundle_is_reported() {
        let config = Config {
            ca_cert: Some("/nonexistent/katello-server-ca.pem".into()),
            ..Config::default()
        };
        let err = HttpInventoryClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("CA bundle"));
    }
}
