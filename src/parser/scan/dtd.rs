//! The document type declaration, markup declarations and conditional
//! sections.

use memchr::memchr;

use crate::{
    chvalid::{xml_is_blank_char, xml_is_pubid_char},
    dtd::{
        XmlAttributeDefault, XmlAttributeType, XmlElementContent, XmlElementContentOccur,
        XmlElementTypeVal, XmlEntityType,
    },
    error::{XmlError, XmlParserErrors},
    parser::sax::XmlScanEvent,
};

use super::{
    XmlScanAttDef, XmlScanEntity, XmlScanPhase, XmlTextScanner, collapse_whitespace,
    find_unquoted, name_len,
};

type DeclResult<T> = Result<T, (XmlParserErrors, String)>;

fn decl_error<T>(code: XmlParserErrors, msg: impl Into<String>) -> DeclResult<T> {
    Err((code, msg.into()))
}

/// A cursor over the text of one markup declaration.
struct XmlDeclCursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> XmlDeclCursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos == self.s.len()
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn skip_blanks(&mut self) -> bool {
        let n = self
            .rest()
            .bytes()
            .take_while(|&b| xml_is_blank_char(b as u32))
            .count();
        self.pos += n;
        n > 0
    }

    fn require_blanks(&mut self, what: &str) -> DeclResult<()> {
        if self.skip_blanks() {
            Ok(())
        } else {
            decl_error(
                XmlParserErrors::XmlErrSpaceRequired,
                format!("Space required {what}"),
            )
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Option<&'a str> {
        let len = name_len(self.rest());
        if len == 0 {
            return None;
        }
        let name = &self.rest()[..len];
        self.pos += len;
        Some(name)
    }

    fn require_name(&mut self, msg: &str) -> DeclResult<&'a str> {
        match self.name() {
            Some(name) => Ok(name),
            None => decl_error(XmlParserErrors::XmlErrNameRequired, msg),
        }
    }

    fn nmtoken(&mut self) -> Option<&'a str> {
        let len = self
            .rest()
            .char_indices()
            .find(|&(_, c)| !crate::chvalid::xml_is_name_char(c))
            .map_or(self.rest().len(), |(i, _)| i);
        if len == 0 {
            return None;
        }
        let token = &self.rest()[..len];
        self.pos += len;
        Some(token)
    }

    /// A quoted literal, without its quotes.
    fn literal(&mut self) -> DeclResult<&'a str> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                return decl_error(
                    XmlParserErrors::XmlErrLiteralNotStarted,
                    "String not started expecting ' or \"",
                );
            }
        };
        let Some(close) = memchr(quote, &self.rest().as_bytes()[1..]) else {
            return decl_error(
                XmlParserErrors::XmlErrLiteralNotFinished,
                "String not closed expecting \" or '",
            );
        };
        let literal = &self.rest()[1..close + 1];
        self.pos += close + 2;
        Ok(literal)
    }

    fn pubid_literal(&mut self) -> DeclResult<&'a str> {
        let literal = self.literal()?;
        if !literal.chars().all(|c| xml_is_pubid_char(c as u32)) {
            return decl_error(
                XmlParserErrors::XmlErrPubidRequired,
                "Invalid char in PubidLiteral",
            );
        }
        Ok(literal)
    }

    /// ```text
    /// [75] ExternalID ::= 'SYSTEM' S SystemLiteral
    ///                   | 'PUBLIC' S PubidLiteral S SystemLiteral
    /// [83] PublicID   ::= 'PUBLIC' S PubidLiteral
    /// ```
    ///
    /// With `strict` unset the system literal after a public identifier
    /// is optional, as in notation declarations.
    fn external_id(&mut self, strict: bool) -> DeclResult<(Option<&'a str>, Option<&'a str>)> {
        if self.eat("SYSTEM") {
            self.require_blanks("after 'SYSTEM'")?;
            return Ok((None, Some(self.literal()?)));
        }
        if self.eat("PUBLIC") {
            self.require_blanks("after 'PUBLIC'")?;
            let public_id = self.pubid_literal()?;
            let save = self.pos;
            let blank = self.skip_blanks();
            if matches!(self.peek(), Some(b'"' | b'\'')) {
                if !blank {
                    return decl_error(
                        XmlParserErrors::XmlErrSpaceRequired,
                        "Space required after the Public Identifier",
                    );
                }
                return Ok((Some(public_id), Some(self.literal()?)));
            }
            if strict {
                return decl_error(
                    XmlParserErrors::XmlErrURIRequired,
                    "SYSTEM or PUBLIC, the URI is missing",
                );
            }
            self.pos = save;
            return Ok((Some(public_id), None));
        }
        Ok((None, None))
    }

    fn end(&mut self) -> DeclResult<()> {
        self.skip_blanks();
        if self.at_end() {
            Ok(())
        } else {
            decl_error(
                XmlParserErrors::XmlErrGtRequired,
                format!("expected '>' before '{}'", self.rest()),
            )
        }
    }

    fn occurrence(&mut self) -> XmlElementContentOccur {
        let occur = match self.peek() {
            Some(b'?') => XmlElementContentOccur::XmlElementContentOpt,
            Some(b'*') => XmlElementContentOccur::XmlElementContentMult,
            Some(b'+') => XmlElementContentOccur::XmlElementContentPlus,
            _ => return XmlElementContentOccur::XmlElementContentOnce,
        };
        self.pos += 1;
        occur
    }

    /// ```text
    /// [48] cp       ::= (Name | choice | seq) ('?' | '*' | '+')?
    /// [49] choice   ::= '(' S? cp ( S? '|' S? cp )+ S? ')'
    /// [50] seq      ::= '(' S? cp ( S? ',' S? cp )* S? ')'
    /// ```
    fn content_particle(&mut self, depth: usize) -> DeclResult<XmlElementContent> {
        if depth > 128 {
            return decl_error(
                XmlParserErrors::XmlErrElemcontentNotFinished,
                "xmlParseElementChildrenContentDecl : depth too deep",
            );
        }
        let particle = if self.eat("(") {
            self.skip_blanks();
            let mut children = vec![self.content_particle(depth + 1)?];
            let mut separator = None;
            loop {
                self.skip_blanks();
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(sep @ (b'|' | b',')) => {
                        if let Some(expected) = separator.filter(|&s| s != sep) {
                            return decl_error(
                                XmlParserErrors::XmlErrSeparatorRequired,
                                format!(
                                    "xmlParseElementChildrenContentDecl : '{}' expected",
                                    expected as char
                                ),
                            );
                        }
                        separator = Some(sep);
                        self.pos += 1;
                        self.skip_blanks();
                        children.push(self.content_particle(depth + 1)?);
                    }
                    _ => {
                        return decl_error(
                            XmlParserErrors::XmlErrElemcontentNotFinished,
                            "xmlParseElementChildrenContentDecl : ',' '|' or ')' expected",
                        );
                    }
                }
            }
            if separator == Some(b'|') {
                XmlElementContent::or(children)
            } else {
                XmlElementContent::seq(children)
            }
        } else {
            let name =
                self.require_name("xmlParseElementChildrenContentDecl : Name or '(' expected")?;
            XmlElementContent::element(name)
        };
        let occur = self.occurrence();
        Ok(particle.with_occur(occur))
    }

    /// ```text
    /// [51] Mixed ::= '(' S? '#PCDATA' (S? '|' S? Name)* S? ')*'
    ///              | '(' S? '#PCDATA' S? ')'
    /// ```
    ///
    /// The cursor is after `#PCDATA`.
    fn mixed_content(&mut self) -> DeclResult<XmlElementContent> {
        let mut children = vec![XmlElementContent::pcdata()];
        loop {
            self.skip_blanks();
            if self.eat(")") {
                break;
            }
            if !self.eat("|") {
                return decl_error(
                    XmlParserErrors::XmlErrMixedNotFinished,
                    "xmlParseElementMixedContentDecl : '|' or ')' expected",
                );
            }
            self.skip_blanks();
            let name = self.require_name("xmlParseElementMixedContentDecl : Name expected")?;
            children.push(XmlElementContent::element(name));
        }
        let mult = self.eat("*");
        if children.len() > 1 && !mult {
            return decl_error(
                XmlParserErrors::XmlErrMixedNotFinished,
                "xmlParseElementMixedContentDecl : ')*' expected",
            );
        }
        let content = XmlElementContent::or(children);
        Ok(if mult {
            content.with_occur(XmlElementContentOccur::XmlElementContentMult)
        } else {
            content
        })
    }
}

/// Find the end of an ignored conditional section, nested sections
/// included.
///
/// `s` starts right after the opening `[`. Returns the length up to and
/// including the closing `]]>`.
fn find_ignore_end(s: &[u8]) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = 0;
    while pos < s.len() {
        if s[pos..].starts_with(b"<![") {
            depth += 1;
            pos += 3;
        } else if s[pos..].starts_with(b"]]>") {
            depth -= 1;
            pos += 3;
            if depth == 0 {
                return Some(pos);
            }
        } else {
            pos += 1;
        }
    }
    None
}

const XML_MARKUP_KEYWORDS: [&str; 4] = ["<!ELEMENT", "<!ATTLIST", "<!ENTITY", "<!NOTATION"];

impl XmlTextScanner {
    fn fatal_decl<T>(&mut self, (code, msg): (XmlParserErrors, String)) -> Result<T, XmlError> {
        self.fatal(code, msg)
    }

    /// Check if parameter-entity references are forbidden inside markup
    /// declarations at this point.
    fn in_internal_subset_text(&self) -> bool {
        self.in_internal_subset || (self.input.internal && self.input.in_internal_subset)
    }

    /// ```text
    /// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S?
    ///                      ('[' intSubset ']' S?)? '>'
    /// ```
    pub(super) fn scan_doctype(&mut self) -> Result<bool, XmlError> {
        const START: usize = "<!DOCTYPE".len();
        let rest = self.rest();
        let Some(end) = find_unquoted(&rest.as_bytes()[START..], b"[>").map(|i| i + START) else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrDoctypeNotFinished,
                    "DOCTYPE improperly terminated",
                );
            }
            return Ok(false);
        };
        let header = rest[START..end].to_owned();
        let has_internal_subset = rest.as_bytes()[end] == b'[';

        let parsed = (|| -> DeclResult<(String, Option<String>, Option<String>)> {
            let mut cursor = XmlDeclCursor::new(&header);
            cursor.require_blanks("after '<!DOCTYPE'")?;
            let name = cursor.require_name("xmlParseDocTypeDecl : no DOCTYPE name !")?;
            cursor.skip_blanks();
            let (public_id, system_id) = cursor.external_id(true)?;
            cursor.end()?;
            Ok((
                name.to_owned(),
                public_id.map(|s| s.to_owned()),
                system_id.map(|s| s.to_owned()),
            ))
        })();
        let (name, public_id, system_id) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fatal_decl(e),
        };

        if system_id.is_some() {
            self.decls.borrow_mut().external_refs = true;
        }
        self.seen_doctype = true;
        self.queue(XmlScanEvent::StartDoctypeDecl {
            name,
            public_id,
            system_id,
            has_internal_subset,
        });
        if has_internal_subset {
            self.in_internal_subset = true;
            self.phase = XmlScanPhase::Subset;
        } else {
            self.queue(XmlScanEvent::EndDoctypeDecl);
        }
        self.advance(end + 1);
        Ok(true)
    }

    /// Between markup declarations, in either subset.
    pub(super) fn scan_subset(&mut self) -> Result<bool, XmlError> {
        if self.skip_blanks() {
            return Ok(true);
        }
        let rest = self.rest();
        let Some(&first) = rest.as_bytes().first() else {
            return Ok(false);
        };
        match first {
            b']' if self.in_internal_subset && self.cond_depth == 0 => {
                let Some(end) = memchr(b'>', rest.as_bytes()) else {
                    if self.at_eof() {
                        return self.fatal(
                            XmlParserErrors::XmlErrDoctypeNotFinished,
                            "DOCTYPE improperly terminated",
                        );
                    }
                    return Ok(false);
                };
                if !rest[1..end]
                    .bytes()
                    .all(|b| xml_is_blank_char(b as u32))
                {
                    return self.fatal(
                        XmlParserErrors::XmlErrDoctypeNotFinished,
                        "DOCTYPE improperly terminated",
                    );
                }
                self.in_internal_subset = false;
                self.phase = XmlScanPhase::Prolog;
                self.queue(XmlScanEvent::EndDoctypeDecl);
                self.advance(end + 1);
                Ok(true)
            }
            b']' if self.cond_depth > 0 => {
                if rest.len() < 3 && "]]>".starts_with(rest) && !self.at_eof() {
                    return Ok(false);
                }
                if !rest.starts_with("]]>") {
                    return self.fatal(
                        XmlParserErrors::XmlErrCondsecNotFinished,
                        "XML conditional section not closed",
                    );
                }
                self.cond_depth -= 1;
                self.advance(3);
                Ok(true)
            }
            b'%' => self.scan_pe_reference(),
            b'<' => {
                if rest.starts_with("<!--") {
                    return self.scan_comment();
                }
                if rest.starts_with("<?") {
                    return self.scan_pi();
                }
                if rest.starts_with("<![") {
                    return self.scan_conditional_section();
                }
                if let Some(keyword) = XML_MARKUP_KEYWORDS
                    .iter()
                    .find(|k| rest.starts_with(**k))
                    .copied()
                {
                    return self.scan_markup_declaration(keyword);
                }
                let partial = XML_MARKUP_KEYWORDS
                    .iter()
                    .chain(["<!--", "<![", "<?"].iter())
                    .any(|k| k.starts_with(rest));
                if partial && !self.at_eof() {
                    return Ok(false);
                }
                self.fatal(
                    XmlParserErrors::XmlErrExtSubsetNotFinished,
                    "Content error in the DTD",
                )
            }
            _ => self.fatal(
                XmlParserErrors::XmlErrExtSubsetNotFinished,
                "Content error in the DTD",
            ),
        }
    }

    /// `%name;` between declarations.
    fn scan_pe_reference(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let len = name_len(&rest[1..]);
        if len == 0 {
            if rest.len() == 1 && !self.at_eof() {
                return Ok(false);
            }
            return self.fatal(
                XmlParserErrors::XmlErrPERefNoName,
                "PEReference: no name",
            );
        }
        match rest.as_bytes().get(len + 1) {
            Some(b';') => {}
            None if !self.at_eof() => return Ok(false),
            _ => {
                return self.fatal(
                    XmlParserErrors::XmlErrPERefSemicolMissing,
                    "PEReference: expecting ';'",
                );
            }
        }
        let name = rest[1..len + 1].to_owned();
        self.decls.borrow_mut().external_refs = true;
        self.queue(XmlScanEvent::EntityReference {
            name,
            is_parameter: true,
        });
        self.advance(len + 2);
        Ok(true)
    }

    /// ```text
    /// [61] conditionalSect ::= includeSect | ignoreSect
    /// [62] includeSect     ::= '<![' S? 'INCLUDE' S? '[' extSubsetDecl ']]>'
    /// [63] ignoreSect      ::= '<![' S? 'IGNORE' S? '[' ignoreSectContents* ']]>'
    /// ```
    fn scan_conditional_section(&mut self) -> Result<bool, XmlError> {
        if self.in_internal_subset_text() {
            return self.fatal(
                XmlParserErrors::XmlErrCondsecInvalid,
                "conditional sections are not allowed in the internal subset",
            );
        }
        let rest = self.rest();
        let Some(open) = memchr(b'[', &rest.as_bytes()[3..]).map(|i| i + 3) else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrCondsecInvalid,
                    "Invalid conditional section: '[' expected",
                );
            }
            return Ok(false);
        };
        let keyword = rest[3..open]
            .trim_matches(|c: char| xml_is_blank_char(c as u32))
            .to_owned();
        let keyword = match keyword.strip_prefix('%').and_then(|k| k.strip_suffix(';')) {
            Some(pe) => match self.decls.borrow().pentities.get(pe) {
                Some(XmlScanEntity::Internal(text)) => text
                    .trim_matches(|c: char| xml_is_blank_char(c as u32))
                    .to_owned(),
                _ => keyword.clone(),
            },
            None => keyword,
        };
        match keyword.as_str() {
            "INCLUDE" => {
                self.cond_depth += 1;
                self.advance(open + 1);
                Ok(true)
            }
            "IGNORE" => {
                let Some(len) = find_ignore_end(&rest.as_bytes()[open + 1..]) else {
                    if self.at_eof() {
                        return self.fatal(
                            XmlParserErrors::XmlErrCondsecNotFinished,
                            "XML conditional section not closed",
                        );
                    }
                    return Ok(false);
                };
                self.advance(open + 1 + len);
                Ok(true)
            }
            _ => self.fatal(
                XmlParserErrors::XmlErrCondsecInvalidKeyword,
                "Invalid conditional section, expecting INCLUDE or IGNORE",
            ),
        }
    }

    /// Replace the parameter-entity references of a declaration by their
    /// replacement text.
    ///
    /// Outside literals the text is padded with spaces; inside entity value
    /// literals (`in_literals`) it is inserted as is.
    fn expand_decl_pe_references(
        &mut self,
        decl: &str,
        in_literals: bool,
    ) -> Result<String, XmlError> {
        if memchr(b'%', decl.as_bytes()).is_none() {
            return Ok(decl.to_owned());
        }
        let mut out = String::with_capacity(decl.len());
        let mut quote = None;
        let mut rest = decl;
        while let Some(c) = rest.chars().next() {
            match quote {
                Some(q) if c == q => quote = None,
                None if c == '"' || c == '\'' => quote = Some(c),
                _ => {}
            }
            let len = if c == '%' { name_len(&rest[1..]) } else { 0 };
            let is_reference = len > 0
                && rest.as_bytes().get(len + 1) == Some(&b';')
                && (quote.is_none() || in_literals);
            if !is_reference {
                out.push(c);
                rest = &rest[c.len_utf8()..];
                continue;
            }
            let name = &rest[1..len + 1];
            if self.in_internal_subset_text() {
                return self.fatal(
                    XmlParserErrors::XmlErrEntityPEInternal,
                    "PEReferences forbidden in internal subset",
                );
            }
            let entity = self.decls.borrow().pentities.get(name).cloned();
            let text = match entity {
                Some(XmlScanEntity::Internal(text)) => text,
                Some(XmlScanEntity::External) => {
                    return self.fatal(
                        XmlParserErrors::XmlErrEntityIsExternal,
                        format!("PEReference: external entity %{name}; inside a markup declaration"),
                    );
                }
                None => {
                    self.warn(
                        XmlParserErrors::XmlWarUndeclaredEntity,
                        format!("PEReference: %{name}; not found"),
                    );
                    String::new()
                }
            };
            if quote.is_some() {
                out.push_str(&text);
            } else {
                out.push(' ');
                out.push_str(&text);
                out.push(' ');
            }
            rest = &rest[len + 2..];
        }
        Ok(out)
    }

    fn scan_markup_declaration(&mut self, keyword: &str) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(end) = find_unquoted(rest.as_bytes(), b">") else {
            if self.at_eof() {
                let code = match keyword {
                    "<!ELEMENT" => XmlParserErrors::XmlErrElemcontentNotFinished,
                    "<!ATTLIST" => XmlParserErrors::XmlErrAttlistNotFinished,
                    "<!NOTATION" => XmlParserErrors::XmlErrNotationNotFinished,
                    _ => XmlParserErrors::XmlErrLiteralNotFinished,
                };
                return self.fatal(code, format!("{} declaration not finished", &keyword[2..]));
            }
            return Ok(false);
        };
        let body = rest[keyword.len()..end].to_owned();
        let body = self.expand_decl_pe_references(&body, keyword == "<!ENTITY")?;
        match keyword {
            "<!ELEMENT" => self.parse_element_decl(&body)?,
            "<!ATTLIST" => self.parse_attlist_decl(&body)?,
            "<!ENTITY" => self.parse_entity_decl(&body)?,
            _ => self.parse_notation_decl(&body)?,
        }
        self.advance(end + 1);
        Ok(true)
    }

    /// ```text
    /// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
    /// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
    /// ```
    fn parse_element_decl(&mut self, body: &str) -> Result<(), XmlError> {
        let parsed = (|| -> DeclResult<(String, XmlElementTypeVal, Option<XmlElementContent>)> {
            let mut cursor = XmlDeclCursor::new(body);
            cursor.require_blanks("after 'ELEMENT'")?;
            let name = cursor.require_name("xmlParseElementDecl: no name for Element")?;
            cursor.require_blanks("after the element name")?;
            let (etype, content) = if cursor.eat("EMPTY") {
                (XmlElementTypeVal::XmlElementTypeEmpty, None)
            } else if cursor.eat("ANY") {
                (XmlElementTypeVal::XmlElementTypeAny, None)
            } else if cursor.peek() == Some(b'(') {
                let start = cursor.pos;
                cursor.pos += 1;
                cursor.skip_blanks();
                if cursor.eat("#PCDATA") {
                    (
                        XmlElementTypeVal::XmlElementTypeMixed,
                        Some(cursor.mixed_content()?),
                    )
                } else {
                    cursor.pos = start;
                    (
                        XmlElementTypeVal::XmlElementTypeElement,
                        Some(cursor.content_particle(0)?),
                    )
                }
            } else {
                return decl_error(
                    XmlParserErrors::XmlErrElemcontentNotStarted,
                    "xmlParseElementDecl: 'EMPTY', 'ANY' or '(' expected",
                );
            };
            cursor.end()?;
            Ok((name.to_owned(), etype, content))
        })();
        let (name, etype, content) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fatal_decl(e),
        };
        self.queue(XmlScanEvent::ElementDecl {
            name,
            etype,
            content,
        });
        Ok(())
    }

    /// ```text
    /// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
    /// [53] AttDef      ::= S Name S AttType S DefaultDecl
    /// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
    /// ```
    fn parse_attlist_decl(&mut self, body: &str) -> Result<(), XmlError> {
        struct RawAttDef {
            name: String,
            atype: XmlAttributeType,
            tree: Option<Vec<String>>,
            def: XmlAttributeDefault,
            default: Option<String>,
        }

        let parsed = (|| -> DeclResult<(String, Vec<RawAttDef>)> {
            let mut cursor = XmlDeclCursor::new(body);
            cursor.require_blanks("after '<!ATTLIST'")?;
            let element = cursor.require_name("ATTLIST: no name for Element")?;
            let mut defs = vec![];
            loop {
                let blank = cursor.skip_blanks();
                if cursor.at_end() {
                    break;
                }
                if !blank {
                    return decl_error(
                        XmlParserErrors::XmlErrSpaceRequired,
                        "Space required after the attribute default value",
                    );
                }
                let name = cursor.require_name("ATTLIST: no name for Attribute")?;
                cursor.require_blanks("after the attribute name")?;

                let (atype, tree) = if cursor.eat("NOTATION") {
                    cursor.require_blanks("after 'NOTATION'")?;
                    if !cursor.eat("(") {
                        return decl_error(
                            XmlParserErrors::XmlErrNotationNotStarted,
                            "'(' required to start 'NOTATION'",
                        );
                    }
                    let tree = enumeration(&mut cursor, true)?;
                    (XmlAttributeType::XmlAttributeNotation, Some(tree))
                } else if cursor.eat("(") {
                    let tree = enumeration(&mut cursor, false)?;
                    (XmlAttributeType::XmlAttributeEnumeration, Some(tree))
                } else {
                    let keyword = cursor.name().unwrap_or_default();
                    match keyword.parse::<XmlAttributeType>() {
                        Ok(atype) => (atype, None),
                        Err(_) => {
                            return decl_error(
                                XmlParserErrors::XmlErrAttlistNotFinished,
                                format!("attribute {name}: unknown type '{keyword}'"),
                            );
                        }
                    }
                };
                cursor.require_blanks("after the attribute type")?;

                let (def, default) = if cursor.eat("#REQUIRED") {
                    (XmlAttributeDefault::XmlAttributeRequired, None)
                } else if cursor.eat("#IMPLIED") {
                    (XmlAttributeDefault::XmlAttributeImplied, None)
                } else {
                    let def = if cursor.eat("#FIXED") {
                        cursor.require_blanks("after '#FIXED'")?;
                        XmlAttributeDefault::XmlAttributeFixed
                    } else {
                        XmlAttributeDefault::XmlAttributeNone
                    };
                    (def, Some(cursor.literal()?.to_owned()))
                };
                defs.push(RawAttDef {
                    name: name.to_owned(),
                    atype,
                    tree,
                    def,
                    default,
                });
            }
            Ok((element.to_owned(), defs))
        })();
        let (element, defs) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fatal_decl(e),
        };

        for def in defs {
            let default = match def.default {
                Some(raw) => {
                    if raw.contains('<') {
                        return self.fatal(
                            XmlParserErrors::XmlErrLtInAttribute,
                            "Unescaped '<' not allowed in attributes values",
                        );
                    }
                    let mut value = String::with_capacity(raw.len());
                    self.expand_attribute_value(&raw, &mut value, &mut vec![])?;
                    if def.atype != XmlAttributeType::XmlAttributeCDATA {
                        value = collapse_whitespace(&value);
                    }
                    Some(value)
                }
                None => None,
            };
            {
                let mut decls = self.decls.borrow_mut();
                let known = decls.attributes.entry(element.clone()).or_default();
                if !known.iter().any(|known| known.name == def.name) {
                    known.push(XmlScanAttDef {
                        name: def.name.clone(),
                        atype: def.atype,
                        def: def.def,
                        default: default.clone(),
                    });
                }
            }
            self.queue(XmlScanEvent::AttlistDecl {
                element: element.clone(),
                attribute: def.name,
                atype: def.atype,
                def: def.def,
                tree: def.tree,
                default_value: default,
            });
        }
        Ok(())
    }

    /// ```text
    /// [70] EntityDecl ::= GEDecl | PEDecl
    /// [71] GEDecl     ::= '<!ENTITY' S Name S EntityDef S? '>'
    /// [72] PEDecl     ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
    /// [73] EntityDef  ::= EntityValue | (ExternalID NDataDecl?)
    /// ```
    fn parse_entity_decl(&mut self, body: &str) -> Result<(), XmlError> {
        type EntityParts = (
            bool,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        );
        let parsed = (|| -> DeclResult<EntityParts> {
            let mut cursor = XmlDeclCursor::new(body);
            cursor.require_blanks("after '<!ENTITY'")?;
            let parameter = cursor.eat("%");
            if parameter {
                cursor.require_blanks("after '%'")?;
            }
            let name = cursor.require_name("xmlParseEntityDecl: no name")?;
            cursor.require_blanks("after the entity name")?;
            let mut value = None;
            let mut notation = None;
            let (public_id, system_id) = cursor.external_id(true)?;
            if system_id.is_none() {
                value = Some(cursor.literal()?.to_owned());
            } else {
                let blank = cursor.skip_blanks();
                if cursor.eat("NDATA") {
                    if parameter {
                        return decl_error(
                            XmlParserErrors::XmlErrGtRequired,
                            "NDATA is not allowed on parameter entities",
                        );
                    }
                    if !blank {
                        return decl_error(
                            XmlParserErrors::XmlErrSpaceRequired,
                            "Space required before 'NDATA'",
                        );
                    }
                    cursor.require_blanks("after 'NDATA'")?;
                    notation = Some(cursor.require_name("NDATA: no notation name")?.to_owned());
                }
            }
            cursor.end()?;
            Ok((
                parameter,
                name.to_owned(),
                value,
                public_id.map(|s| s.to_owned()),
                system_id.map(|s| s.to_owned()),
                notation,
            ))
        })();
        let (parameter, name, value, public_id, system_id, notation) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fatal_decl(e),
        };
        if name.contains(':') {
            return self.fatal(
                XmlParserErrors::XmlNsErrColon,
                format!("colons are forbidden from entities names '{name}'"),
            );
        }
        let value = match value {
            Some(literal) => Some(self.expand_entity_value(&literal)?),
            None => None,
        };

        let etype = match (parameter, value.is_some(), notation.is_some()) {
            (true, true, _) => XmlEntityType::XmlInternalParameterEntity,
            (true, false, _) => XmlEntityType::XmlExternalParameterEntity,
            (false, true, _) => XmlEntityType::XmlInternalGeneralEntity,
            (false, false, false) => XmlEntityType::XmlExternalGeneralParsedEntity,
            (false, false, true) => XmlEntityType::XmlExternalGeneralUnparsedEntity,
        };
        {
            let mut decls = self.decls.borrow_mut();
            let table = if parameter {
                &mut decls.pentities
            } else {
                &mut decls.entities
            };
            table.entry(name.clone()).or_insert_with(|| match &value {
                Some(text) => XmlScanEntity::Internal(text.clone()),
                None => XmlScanEntity::External,
            });
        }
        self.queue(XmlScanEvent::EntityDecl {
            name,
            etype,
            value,
            public_id,
            system_id,
            notation,
        });
        Ok(())
    }

    /// Build the replacement text of an entity value: character references
    /// are replaced, general entity references are kept.
    fn expand_entity_value(&mut self, literal: &str) -> Result<String, XmlError> {
        let mut out = String::with_capacity(literal.len());
        let mut rest = literal;
        while let Some(i) = memchr(b'&', rest.as_bytes()) {
            out.push_str(&rest[..i]);
            rest = &rest[i..];
            if rest.starts_with("&#") {
                let Some((c, len)) = self.parse_char_ref(rest)? else {
                    return self.fatal(
                        XmlParserErrors::XmlErrInvalidCharRef,
                        "CharRef: invalid value",
                    );
                };
                out.push(c);
                rest = &rest[len..];
                continue;
            }
            let len = name_len(&rest[1..]);
            if len == 0 || rest.as_bytes().get(len + 1) != Some(&b';') {
                return self.fatal(
                    XmlParserErrors::XmlErrEntityRefSemicolMissing,
                    "EntityValue: '&' forbidden except for entities references",
                );
            }
            out.push_str(&rest[..len + 2]);
            rest = &rest[len + 2..];
        }
        out.push_str(rest);
        self.check_chars(&out)?;
        Ok(out)
    }

    /// ```text
    /// [82] NotationDecl ::= '<!NOTATION' S Name S (ExternalID | PublicID) S? '>'
    /// ```
    fn parse_notation_decl(&mut self, body: &str) -> Result<(), XmlError> {
        let parsed = (|| -> DeclResult<(String, Option<String>, Option<String>)> {
            let mut cursor = XmlDeclCursor::new(body);
            cursor.require_blanks("after '<!NOTATION'")?;
            let name = cursor.require_name("Name expected in NOTATION declaration")?;
            cursor.require_blanks("after the NOTATION name")?;
            let (public_id, system_id) = cursor.external_id(false)?;
            if public_id.is_none() && system_id.is_none() {
                return decl_error(
                    XmlParserErrors::XmlErrNotationNotStarted,
                    "NOTATION: PUBLIC or SYSTEM expected",
                );
            }
            cursor.end()?;
            Ok((
                name.to_owned(),
                public_id.map(|s| s.to_owned()),
                system_id.map(|s| s.to_owned()),
            ))
        })();
        let (name, public_id, system_id) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.fatal_decl(e),
        };
        if name.contains(':') {
            return self.fatal(
                XmlParserErrors::XmlNsErrColon,
                format!("colons are forbidden from notation names '{name}'"),
            );
        }
        self.queue(XmlScanEvent::NotationDecl {
            name,
            public_id,
            system_id,
        });
        Ok(())
    }
}

/// ```text
/// [58] NotationType ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
/// [59] Enumeration  ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
/// ```
///
/// The cursor is after the opening parenthesis.
fn enumeration(cursor: &mut XmlDeclCursor<'_>, names: bool) -> DeclResult<Vec<String>> {
    let mut tree: Vec<String> = vec![];
    loop {
        cursor.skip_blanks();
        let token = if names { cursor.name() } else { cursor.nmtoken() };
        let Some(token) = token else {
            return decl_error(
                if names {
                    XmlParserErrors::XmlErrNameRequired
                } else {
                    XmlParserErrors::XmlErrNmtokenRequired
                },
                "Name or NmToken expected in enumeration",
            );
        };
        if tree.iter().any(|t| t == token) {
            return decl_error(
                XmlParserErrors::XmlDTDDupToken,
                format!("standalone: attribute enumeration value token {token} duplicated"),
            );
        }
        tree.push(token.to_owned());
        cursor.skip_blanks();
        if cursor.eat(")") {
            return Ok(tree);
        }
        if !cursor.eat("|") {
            return decl_error(
                XmlParserErrors::XmlErrAttlistNotFinished,
                "'|' or ')' expected in enumeration",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_content_particles() {
        let mut cursor = XmlDeclCursor::new("(a , b? , (c | d)*)+");
        let content = cursor.content_particle(0).unwrap();
        assert_eq!(content.to_string(), "(a , b? , (c | d)*)+");
        assert!(cursor.at_end());

        let mut cursor = XmlDeclCursor::new("(a , b | c)");
        assert!(cursor.content_particle(0).is_err());
    }

    #[test]
    fn mixed_content() {
        let mut cursor = XmlDeclCursor::new(" | a | b )*");
        let content = cursor.mixed_content().unwrap();
        assert_eq!(content.to_string(), "(#PCDATA | a | b)*");

        let mut cursor = XmlDeclCursor::new(")");
        assert_eq!(cursor.mixed_content().unwrap().to_string(), "(#PCDATA)");

        let mut cursor = XmlDeclCursor::new("| a)");
        assert!(cursor.mixed_content().is_err());
    }

    #[test]
    fn external_ids() {
        let mut cursor = XmlDeclCursor::new("PUBLIC \"-//X//EN\" 'x.dtd'");
        assert_eq!(
            cursor.external_id(true).unwrap(),
            (Some("-//X//EN"), Some("x.dtd"))
        );
        let mut cursor = XmlDeclCursor::new("PUBLIC \"-//X//EN\"");
        assert!(cursor.external_id(true).is_err());
        let mut cursor = XmlDeclCursor::new("PUBLIC \"-//X//EN\"");
        assert_eq!(cursor.external_id(false).unwrap(), (Some("-//X//EN"), None));
    }

    #[test]
    fn ignored_sections_nest() {
        assert_eq!(find_ignore_end(b" <![ x ]]> ]]>rest"), Some(14));
        assert_eq!(find_ignore_end(b" <![ x ]]>"), None);
    }
}
