//! End-to-end metadata resolution against a mock registry

mod helper;

use mockito::{Matcher, Server};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use helper::{nupkg, nuspec, registry_page, test_config};
use package_meta::metadata::{MetadataError, MetadataProperty, MetadataResolver, PackageRequest};

#[tokio::test(flavor = "multi_thread")]
async fn resolves_each_property_from_first_tier_that_has_it() {
    let mut server = Server::new_async().await;
    // Manifest without a license: the license group must come from the page
    let package = server
        .mock("GET", "/flat/contoso.json/2.1.0/contoso.json.2.1.0.nupkg")
        .with_status(200)
        .with_body(nupkg(&[(
            "Contoso.Json.nuspec",
            &nuspec(
                "Contoso.Json",
                "2.1.0",
                "<title>Contoso JSON</title><authors>Contoso</authors>\
                 <licenseUrl>https://aka.ms/deprecateLicenseUrl</licenseUrl>",
            ),
        )]))
        .expect(1)
        .create_async()
        .await;
    let page = server
        .mock("GET", "/packages/Contoso.Json/2.1.0")
        .with_status(200)
        .with_body(registry_page("Contoso.Json", "2.1.0", Some("MIT"), &["json"]))
        .expect(1)
        .create_async()
        .await;
    let api = server
        .mock("GET", "/api/Contoso.Json/2.1.0")
        .with_status(200)
        .with_body(r#"{"copyright":"(c) Contoso","repositoryUrl":"https://git.example.com/json"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let resolver = MetadataResolver::from_config(&test_config(&server.url(), &dir, true)).unwrap();
    let metadata = resolver
        .resolve(
            &PackageRequest::new("Contoso.Json", "2.1.0"),
            &CancellationToken::new(),
        )
        .await;

    package.assert_async().await;
    page.assert_async().await;
    api.assert_async().await;

    assert_eq!(metadata.get(MetadataProperty::Title), Some("Contoso JSON"));
    assert_eq!(metadata.get(MetadataProperty::Authors), Some("Contoso"));
    assert_eq!(
        metadata.get(MetadataProperty::Description),
        Some("Contoso.Json from the registry")
    );
    assert_eq!(
        metadata.get(MetadataProperty::ProjectUrl),
        Some("https://example.com/Contoso.Json")
    );
    assert_eq!(
        metadata.get(MetadataProperty::RepositoryUrl),
        Some("https://git.example.com/json")
    );
    assert_eq!(metadata.get(MetadataProperty::Copyright), Some("(c) Contoso"));
    assert_eq!(metadata.get(MetadataProperty::Tags), Some("json"));
    assert_eq!(metadata.get(MetadataProperty::LicensesNames), Some("MIT"));
    assert_eq!(metadata.get(MetadataProperty::License), Some("MIT"));
    assert_eq!(
        metadata.get(MetadataProperty::LicenseUrl),
        Some("https://licenses.nuget.org/MIT")
    );
    assert_eq!(metadata.get(MetadataProperty::LicenseContent), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_resolver_reuses_downloaded_package_and_cached_responses() {
    let mut server = Server::new_async().await;
    let package = server
        .mock("GET", "/flat/cached.pkg/1.0.0/cached.pkg.1.0.0.nupkg")
        .with_status(200)
        .with_body(nupkg(&[
            (
                "Cached.Pkg.nuspec",
                &nuspec(
                    "Cached.Pkg",
                    "1.0.0",
                    r#"<license type="file">LICENSE.md</license>"#,
                ),
            ),
            ("LICENSE.md", "Proprietary terms"),
        ]))
        .expect(1)
        .create_async()
        .await;
    let page = server
        .mock("GET", "/packages/Cached.Pkg/1.0.0")
        .with_status(200)
        .with_body(registry_page("Cached.Pkg", "1.0.0", None, &[]))
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.url(), &dir, false);
    let request = PackageRequest::new("Cached.Pkg", "1.0.0");

    for _ in 0..2 {
        let resolver = MetadataResolver::from_config(&config).unwrap();
        let metadata = resolver.resolve(&request, &CancellationToken::new()).await;

        assert_eq!(
            metadata.get(MetadataProperty::Description),
            Some("Cached.Pkg from the registry")
        );
        assert_eq!(metadata.get(MetadataProperty::License), None);
        assert_eq!(
            metadata.get(MetadataProperty::LicenseContent),
            Some("Proprietary terms")
        );
    }

    package.assert_async().await;
    page.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn package_archives_are_not_kept_in_response_cache() {
    let mut server = Server::new_async().await;
    // A successful but unreadable archive must be fetched again next time
    let package = server
        .mock("GET", "/flat/broken.pkg/1.0.0/broken.pkg.1.0.0.nupkg")
        .with_status(200)
        .with_body("not a zip archive")
        .expect(2)
        .create_async()
        .await;
    let page = server
        .mock("GET", "/packages/Broken.Pkg/1.0.0")
        .with_status(200)
        .with_body(registry_page("Broken.Pkg", "1.0.0", None, &[]))
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.url(), &dir, false);
    let request = PackageRequest::new("Broken.Pkg", "1.0.0");

    for _ in 0..2 {
        let resolver = MetadataResolver::from_config(&config).unwrap();
        let metadata = resolver.resolve(&request, &CancellationToken::new()).await;
        assert_eq!(metadata.get(MetadataProperty::Title), Some("Broken.Pkg"));
    }

    package.assert_async().await;
    page.assert_async().await;

    let persisted = std::fs::read_dir(dir.path().join("responses"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .count();
    assert_eq!(persisted, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_api_failure_is_reported_only_where_reached() {
    let mut server = Server::new_async().await;
    let _package = server
        .mock("GET", Matcher::Regex(r"^/flat/.*".to_string()))
        .with_status(404)
        .create_async()
        .await;
    let _page = server
        .mock("GET", "/packages/Partial.Pkg/3.0.0")
        .with_status(200)
        .with_body(registry_page("Partial.Pkg", "3.0.0", Some("Apache-2.0"), &[]))
        .create_async()
        .await;
    let api = server
        .mock("GET", "/api/Partial.Pkg/3.0.0")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let resolver = MetadataResolver::from_config(&test_config(&server.url(), &dir, true)).unwrap();
    let metadata = resolver
        .resolve(
            &PackageRequest::new("Partial.Pkg", "3.0.0"),
            &CancellationToken::new(),
        )
        .await;

    api.assert_async().await;

    assert_eq!(metadata.get(MetadataProperty::Title), Some("Partial.Pkg"));
    assert_eq!(metadata.get(MetadataProperty::License), Some("Apache-2.0"));
    assert!(matches!(
        metadata.error(MetadataProperty::Authors),
        Some(MetadataError::CustomApi { .. })
    ));
    assert!(matches!(
        metadata.error(MetadataProperty::Copyright),
        Some(MetadataError::CustomApi { .. })
    ));
}

#[tokio::test]
async fn cancelled_resolution_issues_no_requests() {
    let mut server = Server::new_async().await;
    let any = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let resolver = MetadataResolver::from_config(&test_config(&server.url(), &dir, true)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let metadata = resolver
        .resolve(&PackageRequest::new("Any.Pkg", "1.0.0"), &cancel)
        .await;

    any.assert_async().await;
    assert!(
        metadata
            .iter()
            .all(|(_, value)| matches!(value, Err(MetadataError::Cancelled)))
    );
}
