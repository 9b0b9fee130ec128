//! Package fixtures: manifests, archives and registry pages

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

/// A `.nuspec` document with `extra` spliced into `<metadata>`
pub fn nuspec(id: &str, version: &str, extra: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{}</id>
    <version>{}</version>
    {}
  </metadata>
</package>"#,
        id, version, extra
    )
}

/// An in-memory `.nupkg` holding the given entries
pub fn nupkg(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A minimal registry package page
pub fn registry_page(title: &str, version: &str, license: Option<&str>, tags: &[&str]) -> String {
    let license_link = license
        .map(|expr| {
            format!(
                r#"<a href="https://licenses.nuget.org/{}" aria-label="License {}">{} license</a>"#,
                expr, expr, expr
            )
        })
        .unwrap_or_default();
    let tag_links: String = tags
        .iter()
        .map(|tag| {
            format!(
                r#"<a href="/packages?q=Tags%3A%22{}%22" class="tag">{}</a>"#,
                tag, tag
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta property="og:title" content="{} {}" />
  <meta name="description" content="{} from the registry" />
</head>
<body>
  <a href="https://example.com/{}" data-track="outbound-project-url">Project website</a>
  {}
  {}
</body>
</html>"#,
        title, version, title, title, license_link, tag_links
    )
}
