//! Metadata properties and the per-property resolution result

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::metadata::error::MetadataError;

/// The fixed set of properties resolved for a package, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataProperty {
    Title,
    Authors,
    Description,
    ProjectUrl,
    RepositoryUrl,
    Copyright,
    Tags,
    /// Every license identifier from the license expression
    LicensesNames,
    /// Primary license identifier
    License,
    LicenseUrl,
    LicenseContent,
}

impl MetadataProperty {
    pub const ALL: [MetadataProperty; 11] = [
        MetadataProperty::Title,
        MetadataProperty::Authors,
        MetadataProperty::Description,
        MetadataProperty::ProjectUrl,
        MetadataProperty::RepositoryUrl,
        MetadataProperty::Copyright,
        MetadataProperty::Tags,
        MetadataProperty::LicensesNames,
        MetadataProperty::License,
        MetadataProperty::LicenseUrl,
        MetadataProperty::LicenseContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataProperty::Title => "Title",
            MetadataProperty::Authors => "Authors",
            MetadataProperty::Description => "Description",
            MetadataProperty::ProjectUrl => "ProjectUrl",
            MetadataProperty::RepositoryUrl => "RepositoryUrl",
            MetadataProperty::Copyright => "Copyright",
            MetadataProperty::Tags => "Tags",
            MetadataProperty::LicensesNames => "LicensesNames",
            MetadataProperty::License => "License",
            MetadataProperty::LicenseUrl => "LicenseUrl",
            MetadataProperty::LicenseContent => "LicenseContent",
        }
    }

    /// Whether the property belongs to the license group resolved from one tier
    pub fn is_license(&self) -> bool {
        matches!(
            self,
            MetadataProperty::LicensesNames
                | MetadataProperty::License
                | MetadataProperty::LicenseUrl
                | MetadataProperty::LicenseContent
        )
    }
}

impl fmt::Display for MetadataProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetadataProperty::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown metadata property: {}", s))
    }
}

pub type PropertyValue = Result<Option<String>, MetadataError>;

/// Resolution outcome for every property of one package version
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    values: IndexMap<MetadataProperty, PropertyValue>,
}

impl PackageMetadata {
    pub(crate) fn new(values: IndexMap<MetadataProperty, PropertyValue>) -> Self {
        Self { values }
    }

    /// Resolved value, `None` when unresolved or failed
    pub fn get(&self, property: MetadataProperty) -> Option<&str> {
        self.values
            .get(&property)
            .and_then(|v| v.as_ref().ok())
            .and_then(|v| v.as_deref())
    }

    /// Failure recorded for the property, if any
    pub fn error(&self, property: MetadataProperty) -> Option<&MetadataError> {
        self.values.get(&property).and_then(|v| v.as_ref().err())
    }

    pub fn result(&self, property: MetadataProperty) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataProperty, &PropertyValue)> {
        self.values.iter().map(|(p, v)| (*p, v))
    }

    /// Render as a JSON object; failures become `{"error": "..."}`
    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .iter()
            .map(|(property, value)| {
                let rendered = match value {
                    Ok(Some(v)) => Value::String(v.clone()),
                    Ok(None) => Value::Null,
                    Err(e) => json!({ "error": e.to_string() }),
                };
                (property.as_str().to_string(), rendered)
            })
            .collect();
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("licensesnames", MetadataProperty::LicensesNames)]
    #[case("ProjectUrl", MetadataProperty::ProjectUrl)]
    #[case("TITLE", MetadataProperty::Title)]
    fn parses_property_names_case_insensitively(
        #[case] input: &str,
        #[case] expected: MetadataProperty,
    ) {
        assert_eq!(input.parse::<MetadataProperty>(), Ok(expected));
    }

    #[test]
    fn unknown_property_is_rejected() {
        assert!("Version".parse::<MetadataProperty>().is_err());
    }

    #[test]
    fn license_group_is_contiguous_at_the_end() {
        let first_license = MetadataProperty::ALL
            .iter()
            .position(MetadataProperty::is_license)
            .unwrap();
        assert!(MetadataProperty::ALL[first_license..]
            .iter()
            .all(MetadataProperty::is_license));
    }

    #[test]
    fn to_json_renders_values_absence_and_errors() {
        let metadata = PackageMetadata::new(IndexMap::from([
            (MetadataProperty::Title, Ok(Some("Serilog".to_string()))),
            (MetadataProperty::Authors, Ok(None)),
            (MetadataProperty::License, Err(MetadataError::Cancelled)),
        ]));

        assert_eq!(
            metadata.to_json(),
            json!({
                "Title": "Serilog",
                "Authors": null,
                "License": { "error": "Resolution cancelled" },
            })
        );
        assert_eq!(metadata.get(MetadataProperty::Title), Some("Serilog"));
        assert_eq!(metadata.get(MetadataProperty::License), None);
        assert!(matches!(
            metadata.error(MetadataProperty::License),
            Some(MetadataError::Cancelled)
        ));
    }
}
