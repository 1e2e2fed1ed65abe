//! Scripted HTTP transport for adapter tests.

use crate::domain::error::EtlError;
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Replies to requests whose URL or query values contain a needle. A route's
/// responses are consumed in order and the last one repeats.
#[derive(Default)]
pub struct StubHttp {
    routes: RefCell<Vec<(String, VecDeque<HttpResponse>)>>,
    pub requests: RefCell<Vec<HttpRequest>>,
}

impl StubHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, needle: &str, status: u16, body: &str) -> Self {
        self.script(needle, vec![(status, body)])
    }

    pub fn script(self, needle: &str, responses: Vec<(u16, &str)>) -> Self {
        let responses = responses
            .into_iter()
            .map(|(status, body)| HttpResponse {
                status,
                body: body.to_string(),
            })
            .collect();
        self.routes.borrow_mut().push((needle.to_string(), responses));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl HttpPort for StubHttp {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, EtlError> {
        self.requests.borrow_mut().push(request.clone());
        let mut routes = self.routes.borrow_mut();
        let matched = routes.iter_mut().find(|(needle, _)| {
            request.url.contains(needle.as_str()) || request.query.iter().any(|(_, v)| v == needle)
        });
        match matched {
            Some((_, responses)) if responses.len() > 1 => Ok(responses.pop_front().unwrap_or_else(unavailable)),
            Some((_, responses)) => Ok(responses.front().cloned().unwrap_or_else(unavailable)),
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

fn unavailable() -> HttpResponse {
    HttpResponse {
        status: 503,
        body: String::new(),
    }
}
