//! Blocking HTTP transport on reqwest.

use crate::domain::error::EtlError;
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse, Method};
use std::time::Duration;

pub const USER_AGENT: &str = "portfolio-etl/1.0";

pub struct ReqwestHttp {
    client: reqwest::blocking::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, EtlError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EtlError::Http {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl HttpPort for ReqwestHttp {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, EtlError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().map_err(|e| EtlError::Http {
            reason: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| EtlError::Http {
            reason: format!("failed to read body: {e}"),
        })?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client() {
        assert!(ReqwestHttp::new(Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let http = ReqwestHttp::new(Duration::from_millis(200)).unwrap();
        let err = http
            .send(&HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .unwrap_err();
        assert!(matches!(err, EtlError::Http { .. }));
    }
}
