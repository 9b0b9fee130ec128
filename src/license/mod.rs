//! License expression handling

pub mod expression;

pub use expression::{
    DEPRECATED_LICENSE_URL, LICENSE_SERVICE_URL, expression_from_license_url,
    extract_identifiers, license_url,
};
