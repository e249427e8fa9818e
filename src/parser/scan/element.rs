//! Start tags, end tags, attribute values and namespace processing.

use memchr::memchr;

use crate::{
    XML_XML_NAMESPACE, XML_XMLNS_NAMESPACE,
    chvalid::{validate_ncname, xml_is_blank_char},
    dict::encode_raw_name,
    dtd::{XmlAttributeDefault, XmlAttributeType, xml_get_predefined_entity},
    error::{XmlError, XmlParserErrors},
    parser::sax::{XmlScanAttribute, XmlScanEvent, XmlScanMode},
};

use super::{
    XmlNsBinding, XmlOpenTag, XmlScanEntity, XmlScanPhase, XmlTextScanner, collapse_whitespace,
    find_unquoted, is_reserved_xml_binding, name_len,
};

/// Nesting limit of entity references inside attribute values.
const XML_MAX_ATTRIBUTE_ENTITY_DEPTH: usize = 40;

/// An attribute as written in the start tag.
struct XmlRawAttribute {
    qname: String,
    value: String,
    specified: bool,
}

fn skip_blanks(s: &str, pos: usize) -> usize {
    pos + s[pos..]
        .bytes()
        .take_while(|&b| xml_is_blank_char(b as u32))
        .count()
}

/// Split a qualified name into prefix and local part.
fn split_qname(qname: &str) -> Option<(Option<&str>, &str)> {
    match qname.split_once(':') {
        None => Some((None, qname)),
        Some((prefix, local))
            if !prefix.is_empty() && !local.is_empty() && !local.contains(':') =>
        {
            Some((Some(prefix), local))
        }
        Some(_) => None,
    }
}

impl XmlTextScanner {
    /// ```text
    /// [40] STag         ::= '<' Name (S Attribute)* S? '>'
    /// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'
    /// [41] Attribute    ::= Name Eq AttValue
    /// ```
    pub(super) fn scan_start_tag(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let end = match find_unquoted(&rest.as_bytes()[1..], b"<>") {
            Some(end) if rest.as_bytes()[end + 1] == b'>' => end + 1,
            Some(_) => {
                return self.fatal(
                    XmlParserErrors::XmlErrGtRequired,
                    "Couldn't find end of Start Tag",
                );
            }
            None if self.at_eof() => {
                return self.fatal(
                    XmlParserErrors::XmlErrGtRequired,
                    "Couldn't find end of Start Tag",
                );
            }
            None => return Ok(false),
        };
        let tag = rest[1..end].to_owned();
        let (body, empty) = match tag.strip_suffix('/') {
            Some(body) => (body, true),
            None => (tag.as_str(), false),
        };

        let len = name_len(body);
        if len == 0 {
            return self.fatal(
                XmlParserErrors::XmlErrNameRequired,
                "StartTag: invalid element name",
            );
        }
        let qname = body[..len].to_owned();
        let mut attributes = self.parse_attributes(&qname, &body[len..])?;
        self.apply_attribute_defaults(&qname, &mut attributes)?;
        let (name, attributes, ns_count) = self.process_namespaces(&qname, attributes)?;

        self.queue(XmlScanEvent::StartElement {
            name: name.clone(),
            attributes,
        });
        let open = XmlOpenTag {
            qname,
            raw: name,
            line: self.line,
            ns_count,
        };
        if empty {
            self.close_element(open);
        } else {
            self.tags.push(open);
            self.phase = XmlScanPhase::Content;
        }
        self.advance(end + 1);
        Ok(true)
    }

    fn parse_attributes(
        &mut self,
        element: &str,
        mut s: &str,
    ) -> Result<Vec<XmlRawAttribute>, XmlError> {
        let mut attributes: Vec<XmlRawAttribute> = vec![];
        loop {
            let after = skip_blanks(s, 0);
            if after == s.len() {
                return Ok(attributes);
            }
            if after == 0 {
                return self.fatal(
                    XmlParserErrors::XmlErrSpaceRequired,
                    "attributes construct error",
                );
            }
            s = &s[after..];

            let len = name_len(s);
            if len == 0 {
                return self.fatal(
                    XmlParserErrors::XmlErrNameRequired,
                    format!("error parsing attribute name of {element}"),
                );
            }
            let qname = &s[..len];
            let pos = skip_blanks(s, len);
            if !s[pos..].starts_with('=') {
                return self.fatal(
                    XmlParserErrors::XmlErrAttributeWithoutValue,
                    format!("Specification mandates value for attribute {qname}"),
                );
            }
            let pos = skip_blanks(s, pos + 1);
            let quote = match s.as_bytes().get(pos) {
                Some(&q @ (b'"' | b'\'')) => q,
                _ => {
                    return self.fatal(
                        XmlParserErrors::XmlErrAttributeNotStarted,
                        "AttValue: \" or ' expected",
                    );
                }
            };
            let Some(close) = memchr(quote, &s.as_bytes()[pos + 1..]) else {
                return self.fatal(
                    XmlParserErrors::XmlErrAttributeNotFinished,
                    "AttValue: ' expected",
                );
            };
            let raw = &s[pos + 1..pos + 1 + close];
            if raw.contains('<') {
                return self.fatal(
                    XmlParserErrors::XmlErrLtInAttribute,
                    "Unescaped '<' not allowed in attributes values",
                );
            }
            if attributes.iter().any(|attr| attr.qname == qname) {
                return self.fatal(
                    XmlParserErrors::XmlErrAttributeRedefined,
                    format!("Attribute {qname} redefined"),
                );
            }
            let mut value = String::with_capacity(raw.len());
            self.expand_attribute_value(raw, &mut value, &mut vec![])?;
            attributes.push(XmlRawAttribute {
                qname: qname.to_owned(),
                value,
                specified: true,
            });
            s = &s[pos + close + 2..];
        }
    }

    /// Normalize an attribute value as described in section 3.3.3 of XML 1.0.
    ///
    /// `stack` holds the entities being expanded.
    pub(super) fn expand_attribute_value(
        &mut self,
        raw: &str,
        out: &mut String,
        stack: &mut Vec<String>,
    ) -> Result<(), XmlError> {
        let mut rest = raw;
        while let Some(i) = rest.find(['&', '\t', '\n', '\r']) {
            let chunk = &rest[..i];
            self.check_chars(chunk)?;
            out.push_str(chunk);
            rest = &rest[i..];
            if !rest.starts_with('&') {
                out.push(' ');
                rest = &rest[1..];
                continue;
            }
            let Some(semi) = memchr(b';', rest.as_bytes()) else {
                return self.fatal(
                    XmlParserErrors::XmlErrEntityRefSemicolMissing,
                    "EntityRef: expecting ';'",
                );
            };
            let reference = &rest[..semi + 1];
            rest = &rest[semi + 1..];
            if reference.starts_with("&#") {
                if let Some((c, _)) = self.parse_char_ref(reference)? {
                    out.push(c);
                }
                continue;
            }
            let name = &reference[1..semi];
            if name.is_empty() || name_len(name) != name.len() {
                return self.fatal(
                    XmlParserErrors::XmlErrEntityRefNoName,
                    "xmlParseEntityRef: no name",
                );
            }
            if let Some(text) = xml_get_predefined_entity(name) {
                out.push_str(text);
                continue;
            }
            let entity = self.decls.borrow().entities.get(name).cloned();
            match entity {
                Some(XmlScanEntity::Internal(text)) => {
                    if stack.iter().any(|n| n == name) {
                        return self.fatal(
                            XmlParserErrors::XmlErrEntityLoop,
                            format!("Detected an entity reference loop on '{name}'"),
                        );
                    }
                    if stack.len() >= XML_MAX_ATTRIBUTE_ENTITY_DEPTH {
                        return self.fatal(
                            XmlParserErrors::XmlErrEntityLoop,
                            "Maximum entity nesting depth exceeded",
                        );
                    }
                    if text.contains('<') {
                        return self.fatal(
                            XmlParserErrors::XmlErrLtInAttribute,
                            format!("'<' in entity '{name}' is not allowed in attributes values"),
                        );
                    }
                    stack.push(name.to_owned());
                    self.expand_attribute_value(&text, out, stack)?;
                    stack.pop();
                }
                Some(XmlScanEntity::External) => {
                    return self.fatal(
                        XmlParserErrors::XmlErrEntityIsExternal,
                        format!("Attribute references external entity '{name}'"),
                    );
                }
                None => {
                    let decls = self.decls.borrow();
                    let tolerated = decls.external_refs && !decls.standalone;
                    drop(decls);
                    if !tolerated {
                        return self.fatal(
                            XmlParserErrors::XmlErrUndeclaredEntity,
                            format!("Entity '{name}' not defined"),
                        );
                    }
                    self.warn(
                        XmlParserErrors::XmlWarUndeclaredEntity,
                        format!("Entity '{name}' not defined"),
                    );
                }
            }
        }
        self.check_chars(rest)?;
        out.push_str(rest);
        Ok(())
    }

    /// Add the defaults declared for `element` and collapse the values of
    /// declared tokenized attributes.
    fn apply_attribute_defaults(
        &mut self,
        element: &str,
        attributes: &mut Vec<XmlRawAttribute>,
    ) -> Result<(), XmlError> {
        let Some(defs) = self.decls.borrow().attributes.get(element).cloned() else {
            return Ok(());
        };
        for def in defs {
            match attributes.iter_mut().find(|attr| attr.qname == def.name) {
                Some(attr) => {
                    if def.atype != XmlAttributeType::XmlAttributeCDATA {
                        attr.value = collapse_whitespace(&attr.value);
                    }
                }
                None => {
                    if matches!(
                        def.def,
                        XmlAttributeDefault::XmlAttributeRequired
                            | XmlAttributeDefault::XmlAttributeImplied
                    ) {
                        continue;
                    }
                    // defaults are stored normalized
                    let Some(value) = def.default else {
                        continue;
                    };
                    attributes.push(XmlRawAttribute {
                        qname: def.name,
                        value,
                        specified: false,
                    });
                }
            }
        }
        Ok(())
    }

    fn lookup_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_XML_NAMESPACE);
        }
        self.ns
            .iter()
            .rev()
            .find(|binding| binding.prefix.as_deref() == prefix)
            .map(|binding| binding.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Resolve a qualified name to its raw encoded form.
    fn resolve_name(&mut self, qname: &str, is_attribute: bool) -> Result<String, XmlError> {
        let Some((prefix, local)) = split_qname(qname) else {
            return self.fatal(
                XmlParserErrors::XmlNsErrQname,
                format!("Failed to parse QName '{qname}'"),
            );
        };
        if prefix.is_none() && is_attribute {
            return Ok(local.to_owned());
        }
        let uri = match self.lookup_namespace(prefix) {
            Some(uri) => Some(uri.to_owned()),
            None if prefix.is_some() => {
                return self.fatal(
                    XmlParserErrors::XmlNsErrUndefinedNamespace,
                    format!("Namespace prefix {} on {local} is not defined", prefix.unwrap_or_default()),
                );
            }
            None => None,
        };
        Ok(encode_raw_name(uri.as_deref(), local, prefix))
    }

    /// Bind the namespace declarations of a start tag and resolve its names.
    ///
    /// Returns the raw element name, the remaining attributes and the
    /// number of bindings pushed.
    fn process_namespaces(
        &mut self,
        qname: &str,
        attributes: Vec<XmlRawAttribute>,
    ) -> Result<(String, Vec<XmlScanAttribute>, usize), XmlError> {
        let mut ns_count = 0;
        let mut plain = Vec::with_capacity(attributes.len());
        for attr in attributes {
            let prefix = match attr.qname.as_str() {
                "xmlns" => None,
                name => match name.strip_prefix("xmlns:") {
                    Some(prefix) => Some(prefix.to_owned()),
                    None => {
                        plain.push(attr);
                        continue;
                    }
                },
            };
            let uri = attr.value;
            if let Some(prefix) = prefix.as_deref() {
                if validate_ncname(prefix).is_err() {
                    return self.fatal(
                        XmlParserErrors::XmlNsErrQname,
                        format!("Failed to parse QName 'xmlns:{prefix}'"),
                    );
                }
                if prefix == "xmlns" {
                    return self.fatal(
                        XmlParserErrors::XmlNsErrXmlNamespace,
                        "redefinition of the xmlns prefix is forbidden",
                    );
                }
                if uri.is_empty() {
                    return self.fatal(
                        XmlParserErrors::XmlNsErrEmpty,
                        format!("xmlns:{prefix}: Empty XML namespace is not allowed"),
                    );
                }
            }
            if is_reserved_xml_binding(prefix.as_deref(), &uri) {
                continue;
            }
            if prefix.as_deref() == Some("xml") {
                return self.fatal(
                    XmlParserErrors::XmlNsErrXmlNamespace,
                    "xml namespace prefix mapped to wrong URI",
                );
            }
            if uri == XML_XML_NAMESPACE || uri == XML_XMLNS_NAMESPACE {
                return self.fatal(
                    XmlParserErrors::XmlNsErrXmlNamespace,
                    format!("reuse of the reserved namespace {uri} is forbidden"),
                );
            }
            self.queue(XmlScanEvent::StartNamespaceDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            });
            self.ns.push(XmlNsBinding { prefix, uri });
            ns_count += 1;
        }

        let name = self.resolve_name(qname, false)?;
        let mut resolved: Vec<XmlScanAttribute> = Vec::with_capacity(plain.len());
        for attr in plain {
            let name = self.resolve_name(&attr.qname, true)?;
            if resolved.iter().any(|other| other.name == name) {
                return self.fatal(
                    XmlParserErrors::XmlNsErrAttributeRedefined,
                    format!("Namespaced Attribute {} redefined", attr.qname),
                );
            }
            resolved.push(XmlScanAttribute {
                name,
                value: attr.value,
                specified: attr.specified,
            });
        }
        Ok((name, resolved, ns_count))
    }

    fn close_element(&mut self, tag: XmlOpenTag) {
        self.queue(XmlScanEvent::EndElement { name: tag.raw });
        for _ in 0..tag.ns_count {
            if let Some(binding) = self.ns.pop() {
                self.queue(XmlScanEvent::EndNamespaceDecl {
                    prefix: binding.prefix,
                });
            }
        }
        if self.tags.is_empty() && self.mode == XmlScanMode::Document {
            self.phase = XmlScanPhase::Epilog;
        } else {
            self.phase = XmlScanPhase::Content;
        }
    }

    /// ```text
    /// [42] ETag ::= '</' Name S? '>'
    /// ```
    pub(super) fn scan_end_tag(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(end) = memchr(b'>', rest.as_bytes()) else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrGtRequired,
                    "expected '>'",
                );
            }
            return Ok(false);
        };
        let name = rest[2..end]
            .trim_end_matches(|c: char| xml_is_blank_char(c as u32))
            .to_owned();
        if name.is_empty() || name_len(&name) != name.len() {
            return self.fatal(
                XmlParserErrors::XmlErrGtRequired,
                "expected '>'",
            );
        }
        let Some(open) = self.tags.pop() else {
            return self.fatal(
                XmlParserErrors::XmlErrNotWellBalanced,
                format!("chunk is not well balanced: unexpected end tag {name}"),
            );
        };
        if open.qname != name {
            return self.fatal(
                XmlParserErrors::XmlErrTagNameMismatch,
                format!(
                    "Opening and ending tag mismatch: {} line {} and {name}",
                    open.qname, open.line
                ),
            );
        }
        self.close_element(open);
        self.advance(end + 1);
        Ok(true)
    }
}
