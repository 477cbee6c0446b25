//! Export dialect validation
//!
//! Run after a successful parse and before any extraction, so a wrong-dialect
//! file fails loudly instead of silently yielding garbage records.

use super::parser::{Document, ParseError};

/// Substring every recognized WordPress export namespace URI contains
pub const WORDPRESS_NAMESPACE_MARKER: &str = "/wordpress.org/";

/// Verify the document declares the WordPress export namespace.
pub fn verify_wordpress_source(document: &Document) -> Result<(), ParseError> {
    let namespace = document.namespace("wp").ok_or_else(|| {
        ParseError::SourceMismatch("document declares no 'wp' namespace".to_string())
    })?;

    if !namespace.contains(WORDPRESS_NAMESPACE_MARKER) {
        return Err(ParseError::SourceMismatch(format!(
            "'wp' namespace '{namespace}' is not a WordPress export namespace"
        )));
    }

    Ok(())
}
