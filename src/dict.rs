//! Per-engine interning of names and text.
//!
//! The scanner reports element and attribute names in a raw encoded form,
//! `uri SEP local SEP prefix`, where `SEP` is [`NAMESPACE_SEPARATOR`]. This
//! separator never appears in a valid XML name, so splitting is a plain scan.
//! [`XmlDict::split`] memoizes the result per raw string: repeated tags cost
//! one hash lookup and every component of the returned [`ExpandedName`] is
//! shared, so later comparisons are pointer comparisons.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    rc::Rc,
};

use const_format::concatcp;

use crate::{
    XML_XML_NAMESPACE,
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
};

/// Separates the components of a raw encoded name.
pub const NAMESPACE_SEPARATOR: char = '\u{C}';

pub(crate) const XML_BASE_RAW: &str = concatcp!(
    XML_XML_NAMESPACE,
    NAMESPACE_SEPARATOR,
    "base",
    NAMESPACE_SEPARATOR,
    "xml"
);
pub(crate) const XML_LANG_RAW: &str = concatcp!(
    XML_XML_NAMESPACE,
    NAMESPACE_SEPARATOR,
    "lang",
    NAMESPACE_SEPARATOR,
    "xml"
);
pub(crate) const XML_SPACE_RAW: &str = concatcp!(
    XML_XML_NAMESPACE,
    NAMESPACE_SEPARATOR,
    "space",
    NAMESPACE_SEPARATOR,
    "xml"
);

/// Longest whitespace run that is worth interning.
const MAX_INTERNED_TEXT: usize = 256;

/// An interned string.
///
/// Atoms handed out by one [`XmlDict`] are unique per content, so equality
/// and hashing use the address of the shared allocation.
#[derive(Clone)]
pub struct XmlAtom(Rc<str>);

impl XmlAtom {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_rc(&self) -> &Rc<str> {
        &self.0
    }
}

impl Deref for XmlAtom {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for XmlAtom {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for XmlAtom {}

impl PartialEq<str> for XmlAtom {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for XmlAtom {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Hash for XmlAtom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0) as *const u8, state);
    }
}

impl fmt::Debug for XmlAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for XmlAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct ExpandedNameData {
    namespace_uri: Option<XmlAtom>,
    local_name: XmlAtom,
    qualified_name: XmlAtom,
    prefix: Option<XmlAtom>,
}

/// The `(namespace URI, local name, qualified name)` triple of an element
/// or attribute name.
///
/// Two expanded names are equal when their namespace URI and local name are
/// the same atoms; the prefix does not take part.
#[derive(Clone)]
pub struct ExpandedName(Rc<ExpandedNameData>);

impl ExpandedName {
    pub fn namespace_uri(&self) -> Option<&XmlAtom> {
        self.0.namespace_uri.as_ref()
    }

    pub fn local_name(&self) -> &XmlAtom {
        &self.0.local_name
    }

    pub fn qualified_name(&self) -> &XmlAtom {
        &self.0.qualified_name
    }

    pub fn prefix(&self) -> Option<&XmlAtom> {
        self.0.prefix.as_ref()
    }

    /// Check if `self` and `other` are the very same memoized triple.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Check if this name is `{namespace}local`.
    pub fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.0.namespace_uri.as_deref() == namespace && *self.0.local_name == *local
    }
}

impl PartialEq for ExpandedName {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.namespace_uri == other.0.namespace_uri
                && self.0.local_name == other.0.local_name)
    }
}

impl Eq for ExpandedName {}

impl Hash for ExpandedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.namespace_uri.hash(state);
        self.0.local_name.hash(state);
    }
}

impl fmt::Debug for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpandedName")
            .field("namespace_uri", &self.0.namespace_uri)
            .field("local_name", &self.0.local_name)
            .field("qualified_name", &self.0.qualified_name)
            .finish()
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.qualified_name)
    }
}

/// Encode a name the way the scanner reports it.
pub fn encode_raw_name(namespace_uri: Option<&str>, local: &str, prefix: Option<&str>) -> String {
    match (namespace_uri, prefix) {
        (None, _) => local.to_owned(),
        (Some(uri), None) => format!("{uri}{NAMESPACE_SEPARATOR}{local}"),
        (Some(uri), Some(prefix)) => {
            format!("{uri}{NAMESPACE_SEPARATOR}{local}{NAMESPACE_SEPARATOR}{prefix}")
        }
    }
}

/// The interning cache of one engine.
///
/// A dictionary can be moved from one reader to the next to share the
/// interned names across parses.
#[derive(Default)]
pub struct XmlDict {
    strings: HashSet<Rc<str>>,
    names: HashMap<Rc<str>, ExpandedName>,
}

impl XmlDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning the shared atom for its content.
    pub fn intern(&mut self, s: &str) -> XmlAtom {
        if let Some(rc) = self.strings.get(s) {
            return XmlAtom(rc.clone());
        }
        let rc: Rc<str> = Rc::from(s);
        self.strings.insert(rc.clone());
        XmlAtom(rc)
    }

    /// Look `s` up without interning it.
    pub fn lookup(&self, s: &str) -> Option<XmlAtom> {
        self.strings.get(s).map(|rc| XmlAtom(rc.clone()))
    }

    /// Returns the number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Share decoded text when doing so is profitable.
    ///
    /// Whitespace-only runs repeat constantly in indented documents and are
    /// interned; other text gets a fresh allocation.
    pub fn intern_text(&mut self, text: &str) -> Rc<str> {
        if text.len() <= MAX_INTERNED_TEXT && text.bytes().all(|b| b.is_ascii_whitespace()) {
            self.intern(text).0
        } else {
            Rc::from(text)
        }
    }

    /// Split a raw encoded name into its expanded name.
    ///
    /// Returns an internal error if `raw` is not a valid encoding.
    pub fn split(&mut self, raw: &str) -> Result<ExpandedName, XmlError> {
        if let Some(name) = self.names.get(raw) {
            return Ok(name.clone());
        }

        let mut parts = raw.split(NAMESPACE_SEPARATOR);
        let first = parts.next().unwrap_or_default();
        let (namespace_uri, local, prefix) = match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => (None, first, None),
            (Some(local), None, _) => (Some(first), local, None),
            (Some(local), Some(prefix), None) => (Some(first), local, Some(prefix)),
            _ => return Err(malformed_name(raw)),
        };
        if local.is_empty()
            || namespace_uri.is_some_and(|uri| uri.is_empty())
            || prefix.is_some_and(|prefix| prefix.is_empty())
        {
            return Err(malformed_name(raw));
        }

        let local_name = self.intern(local);
        let qualified_name = match prefix {
            Some(prefix) => self.intern(&format!("{prefix}:{local}")),
            None => local_name.clone(),
        };
        let data = ExpandedNameData {
            namespace_uri: namespace_uri.map(|uri| self.intern(uri)),
            local_name,
            qualified_name,
            prefix: prefix.map(|prefix| self.intern(prefix)),
        };
        let name = ExpandedName(Rc::new(data));
        self.names.insert(Rc::from(raw), name.clone());
        Ok(name)
    }
}

fn malformed_name(raw: &str) -> XmlError {
    let printable = raw.replace(NAMESPACE_SEPARATOR, "|");
    XmlError::new(
        XmlErrorDomain::XmlFromDict,
        XmlParserErrors::XmlErrInternalError,
        XmlErrorLevel::XmlErrFatal,
        format!("malformed encoded name '{printable}'"),
    )
    .with_params(Some(&printable), None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_memoized() {
        let mut dict = XmlDict::new();
        let raw = encode_raw_name(Some("urn:a"), "item", Some("a"));
        let first = dict.split(&raw).unwrap();
        let second = dict.split(&raw).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(Rc::ptr_eq(
            first.local_name().as_rc(),
            second.local_name().as_rc()
        ));
        assert!(Rc::ptr_eq(
            first.namespace_uri().unwrap().as_rc(),
            second.namespace_uri().unwrap().as_rc()
        ));
        assert_eq!(first.qualified_name().as_str(), "a:item");
        assert_eq!(first.prefix().unwrap().as_str(), "a");
    }

    #[test]
    fn split_without_separator() {
        let mut dict = XmlDict::new();
        let name = dict.split("para").unwrap();
        assert!(name.namespace_uri().is_none());
        assert_eq!(name.local_name(), name.qualified_name());
        assert!(name.is(None, "para"));
    }

    #[test]
    fn split_default_namespace() {
        let mut dict = XmlDict::new();
        let name = dict.split(&encode_raw_name(Some("urn:x"), "p", None)).unwrap();
        assert_eq!(name.qualified_name().as_str(), "p");
        assert!(name.is(Some("urn:x"), "p"));
    }

    #[test]
    fn prefix_does_not_take_part_in_equality() {
        let mut dict = XmlDict::new();
        let a = dict.split(&encode_raw_name(Some("urn:x"), "p", Some("a"))).unwrap();
        let b = dict.split(&encode_raw_name(Some("urn:x"), "p", Some("b"))).unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_names_are_internal_errors() {
        let mut dict = XmlDict::new();
        for raw in ["a\u{C}b\u{C}c\u{C}d", "urn:x\u{C}", "\u{C}p"] {
            let err = dict.split(raw).unwrap_err();
            assert_eq!(err.code, XmlParserErrors::XmlErrInternalError);
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn whitespace_runs_are_shared() {
        let mut dict = XmlDict::new();
        let a = dict.intern_text("\n  ");
        let b = dict.intern_text("\n  ");
        assert!(Rc::ptr_eq(&a, &b));
        let c = dict.intern_text("text");
        let d = dict.intern_text("text");
        assert!(!Rc::ptr_eq(&c, &d));
    }

    #[test]
    fn xml_attribute_constants() {
        let mut dict = XmlDict::new();
        let base = dict.split(XML_BASE_RAW).unwrap();
        assert!(base.is(Some(XML_XML_NAMESPACE), "base"));
        assert_eq!(base.qualified_name().as_str(), "xml:base");
        let lang = dict.split(XML_LANG_RAW).unwrap();
        assert_eq!(lang.qualified_name().as_str(), "xml:lang");
        let space = dict.split(XML_SPACE_RAW).unwrap();
        assert_eq!(space.qualified_name().as_str(), "xml:space");
    }
}
