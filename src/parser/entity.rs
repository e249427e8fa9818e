//! Loading of external entities.
//!
//! External parsed entities, the external DTD subset, external parameter
//! entities and XInclude resources are all fetched through an
//! [`XmlEntityResolver`]. The reader only ever sees bytes and the URI they
//! were loaded from, which becomes the base URI of the new context.

use std::{collections::HashMap, fs};

use anyhow::{Context, anyhow};

use crate::uri::{build_uri, uri_to_path};

/// The bytes of a resolved entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlInputSource {
    /// The absolute URI the bytes were loaded from.
    pub uri: String,
    pub bytes: Vec<u8>,
}

/// Maps external identifiers to their content.
pub trait XmlEntityResolver {
    /// Load the entity identified by `public_id` and `system_id`.
    ///
    /// `base` is the base URI in scope at the reference; a relative
    /// `system_id` is resolved against it.
    fn resolve(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
        base: Option<&str>,
    ) -> anyhow::Result<XmlInputSource>;
}

fn absolute_uri(system_id: &str, base: Option<&str>) -> anyhow::Result<String> {
    match base {
        Some(base) => build_uri(system_id, base)
            .ok_or_else(|| anyhow!("failed to resolve '{system_id}' against '{base}'")),
        None => Ok(system_id.to_owned()),
    }
}

/// Reads `file:` URIs and plain paths from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFileResolver;

impl XmlEntityResolver for XmlFileResolver {
    #[doc(alias = "xmlLoadExternalEntity")]
    fn resolve(
        &mut self,
        _public_id: Option<&str>,
        system_id: &str,
        base: Option<&str>,
    ) -> anyhow::Result<XmlInputSource> {
        let uri = absolute_uri(system_id, base)?;
        let path = uri_to_path(&uri).with_context(|| format!("'{uri}' is not a local file"))?;
        log::debug!("loading external entity {}", path.display());
        let bytes =
            fs::read(&path).with_context(|| format!("failed to load \"{}\"", path.display()))?;
        Ok(XmlInputSource { uri, bytes })
    }
}

/// Serves entities from memory, keyed by absolute URI.
///
/// Useful for tests and for documents assembled by the caller.
#[derive(Debug, Clone, Default)]
pub struct XmlMemoryResolver {
    entities: HashMap<String, Vec<u8>>,
}

impl XmlMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, uri: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.entities.insert(uri.into(), bytes.into());
        self
    }
}

impl XmlEntityResolver for XmlMemoryResolver {
    fn resolve(
        &mut self,
        _public_id: Option<&str>,
        system_id: &str,
        base: Option<&str>,
    ) -> anyhow::Result<XmlInputSource> {
        let uri = absolute_uri(system_id, base)?;
        log::debug!("loading external entity {uri} from memory");
        let bytes = self
            .entities
            .get(&uri)
            .with_context(|| format!("failed to load \"{uri}\""))?;
        Ok(XmlInputSource {
            uri,
            bytes: bytes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_resolver_uses_base() {
        let mut resolver = XmlMemoryResolver::new();
        resolver.add("http://example.org/dir/ent.xml", "<e/>");
        let source = resolver
            .resolve(None, "ent.xml", Some("http://example.org/dir/doc.xml"))
            .unwrap();
        assert_eq!(source.uri, "http://example.org/dir/ent.xml");
        assert_eq!(source.bytes, b"<e/>");
        assert!(resolver.resolve(None, "missing.xml", None).is_err());
    }

    #[test]
    fn file_resolver_reports_missing_files() {
        let err = XmlFileResolver
            .resolve(None, "does-not-exist.xml", Some("/nonexistent/dir/doc.xml"))
            .unwrap_err();
        assert!(err.to_string().contains("does-not-exist.xml"));
    }
}
