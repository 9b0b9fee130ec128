//! Transport-agnostic request and response values

use reqwest::{Method, Url};

use crate::http::error::HttpError;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Build a GET request for `url`
    pub fn get(url: &str) -> Result<Self, HttpError> {
        let url = Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Lowercased destination host, if the URL has one
    pub fn host(&self) -> Option<String> {
        self.url
            .host_str()
            .filter(|host| !host.is_empty())
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
