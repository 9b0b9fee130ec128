//! `.nuspec` manifest parsing

use roxmltree::{Document, Node};
use thiserror::Error;

use crate::license::{DEPRECATED_LICENSE_URL, expression_from_license_url, license_url};
use crate::metadata::source::RawMetadata;

#[derive(Debug, Error)]
pub enum NuspecError {
    #[error("Invalid manifest XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Manifest has no <metadata> element")]
    MissingMetadata,
}

/// Parsed manifest contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NuspecManifest {
    pub id: Option<String>,
    pub version: Option<String>,
    pub metadata: RawMetadata,
    /// Archive-relative path of the license file for `<license type="file">`
    pub license_file: Option<String>,
}

/// Parse a manifest document
///
/// Elements are matched by local name so every manifest schema namespace is
/// accepted.
pub fn parse(xml: &str) -> Result<NuspecManifest, NuspecError> {
    let doc = Document::parse(xml)?;
    let metadata = doc
        .root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "metadata")
        .ok_or(NuspecError::MissingMetadata)?;

    let mut raw = RawMetadata {
        title: child_text(&metadata, "title"),
        authors: child_text(&metadata, "authors"),
        description: child_text(&metadata, "description"),
        project_url: child_text(&metadata, "projectUrl"),
        repository_url: child_element(&metadata, "repository")
            .and_then(|n| n.attribute("url"))
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
        copyright: child_text(&metadata, "copyright"),
        tags: child_text(&metadata, "tags"),
        ..RawMetadata::default()
    };

    let declared_url = child_text(&metadata, "licenseUrl")
        .filter(|url| !url.eq_ignore_ascii_case(DEPRECATED_LICENSE_URL));

    let mut license_file = None;
    match child_element(&metadata, "license") {
        Some(license) if license.attribute("type") == Some("file") => {
            license_file = node_text(&license);
            raw.license = declared_url.as_deref().and_then(expression_from_license_url);
            raw.license_url = declared_url;
        }
        Some(license) => {
            raw.license = node_text(&license);
            raw.license_url = declared_url.or_else(|| raw.license.as_deref().map(license_url));
        }
        None => {
            raw.license = declared_url.as_deref().and_then(expression_from_license_url);
            raw.license_url = declared_url;
        }
    }

    Ok(NuspecManifest {
        id: child_text(&metadata, "id"),
        version: child_text(&metadata, "version"),
        metadata: raw,
        license_file,
    })
}

fn child_element<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name).and_then(|n| node_text(&n))
}

fn node_text(node: &Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
