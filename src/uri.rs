//! URI reference resolution (RFC 3986), used for `xml:base` and the system
//! identifiers of external entities.

use std::{borrow::Cow, path::PathBuf, string::FromUtf8Error};

/// The five components of a URI reference.
///
/// `authority`, `query` and `fragment` keep the distinction between
/// "absent" and "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlURI<'a> {
    pub scheme: Option<&'a str>,
    pub authority: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> XmlURI<'a> {
    /// Split `s` into its components.
    ///
    /// Returns `None` if `s` contains characters that are never allowed in a
    /// URI reference.
    pub fn parse(s: &'a str) -> Option<Self> {
        if s.bytes().any(|b| b.is_ascii_control() || b == b' ') {
            return None;
        }
        let mut rest = s;
        let mut uri = XmlURI::default();

        if let Some((fragment_less, fragment)) = rest.split_once('#') {
            uri.fragment = Some(fragment);
            rest = fragment_less;
        }
        if let Some((query_less, query)) = rest.split_once('?') {
            uri.query = Some(query);
            rest = query_less;
        }
        if let Some(pos) = rest.find(':') {
            let scheme = &rest[..pos];
            let is_scheme = scheme
                .bytes()
                .next()
                .is_some_and(|b| b.is_ascii_alphabetic())
                && scheme
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b"+-.".contains(&b));
            if is_scheme && !scheme.contains('/') {
                uri.scheme = Some(scheme);
                rest = &rest[pos + 1..];
            }
        }
        if let Some(after) = rest.strip_prefix("//") {
            let end = after.find('/').unwrap_or(after.len());
            uri.authority = Some(&after[..end]);
            rest = &after[end..];
        }
        uri.path = rest;
        Some(uri)
    }

    /// Recompose the reference (RFC 3986, 5.3).
    pub fn save(&self) -> String {
        let mut out = String::new();
        if let Some(scheme) = self.scheme {
            out.push_str(scheme);
            out.push(':');
        }
        if let Some(authority) = self.authority {
            out.push_str("//");
            out.push_str(authority);
        }
        out.push_str(self.path);
        if let Some(query) = self.query {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = self.fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Applies the "remove_dot_segments" algorithm of RFC 3986, 5.2.4.
///
/// If `path` has no dot segments, no extra memory is allocated.
pub fn normalize_uri_path(path: &str) -> Cow<'_, str> {
    if !path
        .split('/')
        .any(|seg| seg == "." || seg == "..")
    {
        return Cow::Borrowed(path);
    }
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = vec![];
    let mut trailing_slash = false;
    for seg in path.split('/').skip(usize::from(absolute)) {
        trailing_slash = false;
        match seg {
            "." => trailing_slash = true,
            ".." => {
                segments.pop();
                trailing_slash = true;
            }
            seg => segments.push(seg),
        }
    }
    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if trailing_slash && !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }
    Cow::Owned(out)
}

fn merge_paths(base: &XmlURI, reference: &str) -> String {
    if base.authority.is_some() && base.path.is_empty() {
        return format!("/{reference}");
    }
    match base.path.rfind('/') {
        Some(pos) => format!("{}{}", &base.path[..=pos], reference),
        None => reference.to_owned(),
    }
}

/// Computes the final URI of the reference `uri` by resolving it against
/// `base`, according to section 5.2 of RFC 3986.
///
/// Returns a new URI string or `None` if an error occurs.
pub fn build_uri(uri: &str, base: &str) -> Option<String> {
    let reference = XmlURI::parse(uri)?;
    if base.is_empty() || reference.scheme.is_some() {
        let path = normalize_uri_path(reference.path);
        return Some(
            XmlURI {
                path: &path,
                ..reference
            }
            .save(),
        );
    }
    let base = XmlURI::parse(base)?;
    if uri.is_empty() {
        return Some(XmlURI { fragment: None, ..base }.save());
    }

    let merged;
    let mut target = XmlURI {
        scheme: base.scheme,
        fragment: reference.fragment,
        ..Default::default()
    };
    if reference.authority.is_some() {
        target.authority = reference.authority;
        merged = normalize_uri_path(reference.path).into_owned();
        target.query = reference.query;
    } else {
        target.authority = base.authority;
        if reference.path.is_empty() {
            merged = base.path.to_owned();
            target.query = reference.query.or(base.query);
        } else {
            let path = if reference.path.starts_with('/') {
                reference.path.to_owned()
            } else {
                merge_paths(&base, reference.path)
            };
            merged = normalize_uri_path(&path).into_owned();
            target.query = reference.query;
        }
    }
    target.path = &merged;
    Some(target.save())
}

/// Unescaping routine, but does not check that the string is an URI.
pub fn unescape_url(mut url: &str) -> Result<Cow<'_, str>, FromUtf8Error> {
    let mut consumed = 0;
    let mut keep = 0;
    let mut owned = None;
    let hex2dec = |hex: u8| -> u8 {
        match hex {
            b'0'..=b'9' => hex - b'0',
            b'a'..=b'f' => hex - b'a' + 10,
            _ => hex - b'A' + 10,
        }
    };
    let orig = url;
    while let Some((non_escaped, maybe_escaped)) = url.split_once('%') {
        keep += non_escaped.len();
        match maybe_escaped.as_bytes() {
            &[hi, lo, ..] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                let owned = owned.get_or_insert_with(|| Vec::with_capacity(orig.len()));
                owned.extend_from_slice(orig[consumed..keep].as_bytes());
                owned.push((hex2dec(hi) << 4) | hex2dec(lo));
                url = &maybe_escaped[2..];
                // the length of '%' + `hi` + `lo`
                keep += 3;
                consumed = keep;
            }
            _ => {
                // the length of '%'
                keep += 1;
                url = maybe_escaped;
            }
        }
    }

    if let Some(mut owned) = owned {
        owned.extend_from_slice(orig[consumed..].as_bytes());
        String::from_utf8(owned).map(Cow::<str>::Owned)
    } else {
        Ok(Cow::Borrowed(orig))
    }
}

/// Map a `file:` URI or a scheme-less reference to a local path.
///
/// Returns `None` for other schemes.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let parsed = XmlURI::parse(uri)?;
    match parsed.scheme {
        None => Some(PathBuf::from(unescape_url(parsed.path).ok()?.as_ref())),
        Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
            if parsed
                .authority
                .is_some_and(|a| !a.is_empty() && a != "localhost")
            {
                return None;
            }
            Some(PathBuf::from(unescape_url(parsed.path).ok()?.as_ref()))
        }
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://a/b/c/d;p?q";

    #[test]
    fn rfc3986_normal_examples() {
        let cases = [
            ("g:h", "g:h"),
            ("g", "http://a/b/c/g"),
            ("./g", "http://a/b/c/g"),
            ("g/", "http://a/b/c/g/"),
            ("/g", "http://a/g"),
            ("//g", "http://g"),
            ("?y", "http://a/b/c/d;p?y"),
            ("g?y", "http://a/b/c/g?y"),
            ("#s", "http://a/b/c/d;p?q#s"),
            ("g#s", "http://a/b/c/g#s"),
            (";x", "http://a/b/c/;x"),
            ("", "http://a/b/c/d;p?q"),
            (".", "http://a/b/c/"),
            ("./", "http://a/b/c/"),
            ("..", "http://a/b/"),
            ("../", "http://a/b/"),
            ("../g", "http://a/b/g"),
            ("../..", "http://a/"),
            ("../../g", "http://a/g"),
        ];
        for (reference, expected) in cases {
            assert_eq!(
                build_uri(reference, BASE).as_deref(),
                Some(expected),
                "reference: {reference}"
            );
        }
    }

    #[test]
    fn relative_file_base() {
        assert_eq!(
            build_uri("ent/chapter.xml", "docs/book.xml").as_deref(),
            Some("docs/ent/chapter.xml")
        );
        assert_eq!(
            build_uri("../x.dtd", "file:///tmp/a/doc.xml").as_deref(),
            Some("file:///tmp/x.dtd")
        );
    }

    #[test]
    fn file_uri_to_path() {
        assert_eq!(
            uri_to_path("file:///tmp/a%20b.xml"),
            Some(PathBuf::from("/tmp/a b.xml"))
        );
        assert_eq!(uri_to_path("doc.xml"), Some(PathBuf::from("doc.xml")));
        assert_eq!(uri_to_path("http://example.com/x"), None);
    }
}
