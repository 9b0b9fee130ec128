//! Public registry page tier
//!
//! Scrapes the package page (`/packages/<id>/<version>`) for metadata the
//! registry renders: title, description, outbound project, repository and
//! license links, the license expression link and tags.

use std::sync::{Arc, OnceLock};

use percent_encoding::percent_decode_str;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::{HttpError, HttpRequest, Transport};
use crate::license::{LICENSE_SERVICE_URL, expression_from_license_url};
use crate::metadata::error::MetadataError;
use crate::metadata::source::{MetadataSource, PackageRequest, RawMetadata, SourceKind};

const TAG_SEARCH_PREFIX: &str = "/packages?q=Tags%3A%22";

/// Second tier: the public registry's package page
pub struct RegistryPageSource {
    client: Arc<dyn Transport>,
    base_url: String,
}

impl RegistryPageSource {
    pub fn new(client: Arc<dyn Transport>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, id: &str, version: &str) -> String {
        format!("{}/packages/{}/{}", self.base_url, id, version)
    }
}

#[async_trait::async_trait]
impl MetadataSource for RegistryPageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::RegistryPage
    }

    async fn fetch(
        &self,
        request: &PackageRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<RawMetadata>, MetadataError> {
        let url = self.page_url(&request.id, &request.version);
        let http_request = match HttpRequest::get(&url) {
            Ok(r) => r.with_header("Accept", "text/html"),
            Err(e) => {
                warn!("Cannot build registry request for {}: {}", request, e);
                return Ok(None);
            }
        };

        let response = match self.client.send(http_request, cancel).await {
            Ok(response) => response,
            Err(HttpError::Cancelled) => return Err(MetadataError::Cancelled),
            Err(e) => {
                warn!("Registry page request failed for {}: {}", url, e);
                return Ok(None);
            }
        };

        if response.status == 404 {
            debug!("Registry has no page for {}", request);
            return Ok(None);
        }
        if !response.is_success() {
            warn!("Registry returned status {}: {}", response.status, url);
            return Ok(None);
        }

        Ok(Some(scrape_package_page(&response.text(), &request.version)))
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(a|meta)\s([^>]*)>").expect("valid regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid regex")
    })
}

/// Attribute name/value pairs of one start tag, names lowercased
fn attributes(tag: &str) -> Vec<(String, String)> {
    attribute_regex()
        .captures_iter(tag)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), unescape_html(value))
        })
        .collect()
}

fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Extract metadata from a package page
///
/// The page title carries the version (`Serilog 3.1.1`); it is stripped so
/// only the package title remains.
pub fn scrape_package_page(html: &str, version: &str) -> RawMetadata {
    let mut raw = RawMetadata::default();
    let mut tags: Vec<String> = Vec::new();

    for caps in tag_regex().captures_iter(html) {
        let element = caps[1].to_ascii_lowercase();
        let attrs = attributes(&caps[2]);

        if element == "meta" {
            let key = attribute(&attrs, "property").or_else(|| attribute(&attrs, "name"));
            let content = attribute(&attrs, "content").map(str::trim).filter(|c| !c.is_empty());
            match (key, content) {
                (Some("og:title"), Some(content)) if raw.title.is_none() => {
                    raw.title = Some(strip_version_suffix(content, version));
                }
                (Some("description"), Some(content)) if raw.description.is_none() => {
                    raw.description = Some(content.to_string());
                }
                _ => {}
            }
            continue;
        }

        let Some(href) = attribute(&attrs, "href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };

        match attribute(&attrs, "data-track") {
            Some("outbound-project-url") if raw.project_url.is_none() => {
                raw.project_url = Some(href.to_string());
            }
            Some("outbound-repository-url") if raw.repository_url.is_none() => {
                raw.repository_url = Some(href.to_string());
            }
            Some("outbound-license-url") if raw.license_url.is_none() => {
                raw.license_url = Some(href.to_string());
            }
            _ => {}
        }

        if raw.license.is_none() && href.starts_with(LICENSE_SERVICE_URL) {
            raw.license = expression_from_license_url(href);
            if raw.license.is_some() && raw.license_url.is_none() {
                raw.license_url = Some(href.to_string());
            }
        }

        if let Some(tag) = href.strip_prefix(TAG_SEARCH_PREFIX).and_then(decode_tag) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    if !tags.is_empty() {
        raw.tags = Some(tags.join(" "));
    }
    raw
}

/// Tag text of a tag search link, up to the closing encoded quote
fn decode_tag(query: &str) -> Option<String> {
    let encoded = query.split("%22").next().unwrap_or_default();
    let tag = percent_decode_str(encoded).decode_utf8().ok()?;
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_string())
}

fn strip_version_suffix(title: &str, version: &str) -> String {
    title
        .strip_suffix(version)
        .map(str::trim_end)
        .filter(|t| !t.is_empty())
        .unwrap_or(title)
        .to_string()
}

/// Decode the character references that appear in attribute values
fn unescape_html(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16).ok())
                    .unwrap_or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, end + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
