//! XML and text declarations.

use memchr::{memchr, memmem};

use crate::{
    chvalid::xml_is_blank_char,
    encoding::find_encoding_handler,
    error::{XmlError, XmlParserErrors},
    parser::sax::{XmlScanEvent, XmlScanHandler, XmlScanMode},
};

use super::{XmlTextScanner, name_len};

/// The pseudo-attributes of a declaration, in order of appearance.
fn parse_pseudo_attributes(body: &str) -> Result<Vec<(&str, &str)>, &'static str> {
    let mut attributes = vec![];
    let mut s = body;
    loop {
        let trimmed = s.trim_start_matches(|c: char| xml_is_blank_char(c as u32));
        if trimmed.is_empty() {
            return Ok(attributes);
        }
        if trimmed.len() == s.len() {
            return Err("Blank needed here");
        }
        s = trimmed;
        let len = name_len(s);
        if len == 0 {
            return Err("parsing XML declaration: '?>' expected");
        }
        let name = &s[..len];
        s = s[len..].trim_start_matches(|c: char| xml_is_blank_char(c as u32));
        let Some(after_eq) = s.strip_prefix('=') else {
            return Err("parsing XML declaration: '=' expected");
        };
        s = after_eq.trim_start_matches(|c: char| xml_is_blank_char(c as u32));
        let quote = match s.as_bytes().first() {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err("String not started expecting ' or \""),
        };
        let Some(close) = memchr(quote, &s.as_bytes()[1..]) else {
            return Err("String not closed expecting \" or '");
        };
        attributes.push((name, &s[1..close + 1]));
        s = &s[close + 2..];
    }
}

/// ```text
/// [81] EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
/// ```
fn is_encoding_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b"._-".contains(&b))
}

fn is_version_number(version: &str) -> bool {
    version
        .strip_prefix("1.")
        .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()))
}

impl XmlTextScanner {
    /// ```text
    /// [23] XMLDecl  ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
    /// [77] TextDecl ::= '<?xml' VersionInfo? EncodingDecl S? '?>'
    /// ```
    pub(super) fn scan_xml_decl(
        &mut self,
        handler: &mut dyn XmlScanHandler,
    ) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(end) = memmem::find(rest.as_bytes(), b"?>") else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrXMLDeclNotFinished,
                    "parsing XML declaration: '?>' expected",
                );
            }
            return Ok(false);
        };
        let body = rest[5..end].to_owned();
        let attributes = match parse_pseudo_attributes(&body) {
            Ok(attributes) => attributes,
            Err(msg) => return self.fatal(XmlParserErrors::XmlErrXMLDeclNotFinished, msg),
        };
        let text_decl = self.mode != XmlScanMode::Document;

        let mut version = None;
        let mut encoding = None;
        let mut standalone = None;
        let mut expected: &[&str] = &["version", "encoding", "standalone"];
        if text_decl {
            expected = &expected[..2];
        }
        for (name, value) in attributes {
            let Some(index) = expected.iter().position(|&e| e == name) else {
                return self.fatal(
                    XmlParserErrors::XmlErrXMLDeclNotFinished,
                    format!("parsing XML declaration: unexpected '{name}'"),
                );
            };
            expected = &expected[index + 1..];
            match name {
                "version" => version = Some(value.to_owned()),
                "encoding" => encoding = Some(value.to_owned()),
                _ => standalone = Some(value.to_owned()),
            }
        }

        match version.as_deref() {
            None if !text_decl => {
                return self.fatal(
                    XmlParserErrors::XmlErrVersionMissing,
                    "Malformed declaration expecting version",
                );
            }
            Some(version) if !is_version_number(version) => {
                return self.fatal(
                    XmlParserErrors::XmlErrUnknownVersion,
                    format!("Unsupported version '{version}'"),
                );
            }
            Some(version) if version != "1.0" => {
                self.warn(
                    XmlParserErrors::XmlWarUnknownVersion,
                    format!("Unsupported version '{version}'"),
                );
            }
            _ => {}
        }
        let standalone = match standalone.as_deref() {
            None => None,
            Some("yes") => Some(true),
            Some("no") => Some(false),
            Some(_) => {
                return self.fatal(
                    XmlParserErrors::XmlErrStandaloneValue,
                    "standalone accepts only 'yes' or 'no'",
                );
            }
        };

        let encoder = match encoding.as_deref() {
            None if text_decl => {
                return self.fatal(
                    XmlParserErrors::XmlErrMissingEncoding,
                    "Missing encoding in text declaration",
                );
            }
            None => None,
            Some(name) if !is_encoding_name(name) => {
                return self.fatal(
                    XmlParserErrors::XmlErrEncodingName,
                    "Invalid XML encoding name",
                );
            }
            Some(name) => match find_encoding_handler(name) {
                Ok(Some(encoder)) => Some(encoder),
                Ok(None) | Err(_) => match handler.unknown_encoding(name) {
                    Some(encoder) => Some(encoder),
                    None => {
                        return self.fatal(
                            XmlParserErrors::XmlErrUnsupportedEncoding,
                            format!("Unsupported encoding: {name}"),
                        );
                    }
                },
            },
        };
        self.decoder.end_declaration(encoder);

        if standalone == Some(true) {
            self.decls.borrow_mut().standalone = true;
        }
        if !text_decl {
            self.queue(XmlScanEvent::XmlDecl {
                version,
                encoding,
                standalone,
            });
        }
        self.advance(end + 2);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_attributes() {
        let attrs = parse_pseudo_attributes(" version='1.0' encoding = \"UTF-8\"").unwrap();
        assert_eq!(attrs, vec![("version", "1.0"), ("encoding", "UTF-8")]);
        assert!(parse_pseudo_attributes(" version='1.0'encoding='x'").is_err());
        assert!(parse_pseudo_attributes(" version=1.0").is_err());
    }

    #[test]
    fn encoding_names() {
        assert!(is_encoding_name("ISO-8859-1"));
        assert!(is_encoding_name("utf_8"));
        assert!(!is_encoding_name("8859"));
        assert!(!is_encoding_name(""));
    }

    #[test]
    fn version_numbers() {
        assert!(is_version_number("1.0"));
        assert!(is_version_number("1.1"));
        assert!(!is_version_number("2.0"));
        assert!(!is_version_number("1."));
    }
}
