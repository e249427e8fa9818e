//! The built-in incremental scanner.
//!
//! [`XmlTextScanner`] keeps the decoded text it has not consumed yet. Each
//! construct is recognized only once it is complete in the buffer; until
//! then the scanner asks for more input. Recognized constructs are turned
//! into events and queued, so a suspension between two events of one
//! construct (namespace declarations and their start tag, say) resumes
//! with the next queued event.

mod dtd;
mod element;
mod xmldecl;

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use memchr::{memchr, memchr2, memmem};

use crate::{
    XML_XML_NAMESPACE,
    chvalid::{xml_is_blank_char, xml_is_char, xml_is_name_char, xml_is_name_start_char},
    dtd::{XmlAttributeDefault, XmlAttributeType, xml_get_predefined_entity},
    encoding::XmlInputDecoder,
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
};

use super::sax::{
    XmlEntityInput, XmlSAXLocator, XmlScanControl, XmlScanEvent, XmlScanHandler, XmlScanMode,
    XmlScanStatus, XmlScanner,
};

/// Consumed text is dropped from the buffer once this much has accumulated.
const XML_SCAN_SHRINK_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlScanEntity {
    Internal(String),
    External,
}

#[derive(Debug, Clone)]
pub(crate) struct XmlScanAttDef {
    pub(crate) name: String,
    pub(crate) atype: XmlAttributeType,
    pub(crate) def: XmlAttributeDefault,
    pub(crate) default: Option<String>,
}

/// Declarations the scanner needs for itself, shared by the scanners of
/// one document.
#[derive(Debug, Default)]
pub(crate) struct XmlScanDecls {
    pub(crate) entities: HashMap<String, XmlScanEntity>,
    pub(crate) pentities: HashMap<String, XmlScanEntity>,
    /// Attribute definitions keyed by element qualified name.
    pub(crate) attributes: HashMap<String, Vec<XmlScanAttDef>>,
    /// The DTD has an external subset or parameter-entity references, so
    /// undeclared entities are not well-formedness errors.
    pub(crate) external_refs: bool,
    pub(crate) standalone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XmlScanPhase {
    /// An XML or text declaration may come.
    Start,
    Prolog,
    Subset,
    Content,
    Epilog,
    Done,
}

#[derive(Debug, Clone)]
struct XmlOpenTag {
    qname: String,
    raw: String,
    line: usize,
    /// Number of namespace bindings declared on this element.
    ns_count: usize,
}

#[derive(Debug, Clone)]
struct XmlNsBinding {
    prefix: Option<String>,
    uri: String,
}

/// A scanner for XML 1.0 text with namespaces.
pub struct XmlTextScanner {
    mode: XmlScanMode,
    input: XmlEntityInput,
    system_id: Option<Rc<str>>,
    decoder: XmlInputDecoder,
    buf: String,
    pos: usize,
    line: usize,
    col: usize,
    terminate: bool,
    status: XmlScanStatus,
    started: bool,
    phase: XmlScanPhase,
    queue: VecDeque<(XmlScanEvent, usize, usize)>,
    warnings: Vec<XmlError>,
    tags: Vec<XmlOpenTag>,
    ns: Vec<XmlNsBinding>,
    decls: Rc<RefCell<XmlScanDecls>>,
    seen_doctype: bool,
    in_internal_subset: bool,
    cond_depth: usize,
}

impl XmlTextScanner {
    /// A scanner for a document entity.
    pub fn new(system_id: Option<&str>) -> Self {
        let input = XmlEntityInput {
            system_id: system_id.map(|s| s.to_owned()),
            ..Default::default()
        };
        Self::with_decls(XmlScanMode::Document, input, Rc::default())
    }

    fn with_decls(
        mode: XmlScanMode,
        input: XmlEntityInput,
        decls: Rc<RefCell<XmlScanDecls>>,
    ) -> Self {
        let decoder = if input.internal {
            XmlInputDecoder::utf8_text()
        } else {
            XmlInputDecoder::new()
        };
        Self {
            mode,
            system_id: input.system_id.as_deref().map(Rc::from),
            input,
            decoder,
            buf: String::new(),
            pos: 0,
            line: 1,
            col: 1,
            terminate: false,
            status: XmlScanStatus::Parsing,
            started: false,
            phase: XmlScanPhase::Start,
            queue: VecDeque::new(),
            warnings: vec![],
            tags: vec![],
            ns: vec![],
            decls,
            seen_doctype: false,
            in_internal_subset: false,
            cond_depth: 0,
        }
    }

    fn rest(&self) -> &str {
        &self.buf[self.pos..]
    }

    fn at_eof(&self) -> bool {
        self.terminate && !self.decoder.has_pending()
    }

    /// Consume `n` bytes, keeping track of lines and columns.
    fn advance(&mut self, n: usize) {
        let consumed = &self.buf.as_bytes()[self.pos..self.pos + n];
        match memchr::memrchr(b'\n', consumed) {
            Some(last) => {
                self.line += memchr::memchr_iter(b'\n', consumed).count();
                self.col = 1 + self.buf[self.pos + last + 1..self.pos + n].chars().count();
            }
            None => self.col += self.buf[self.pos..self.pos + n].chars().count(),
        }
        self.pos += n;
    }

    fn queue(&mut self, event: XmlScanEvent) {
        self.queue.push_back((event, self.line, self.col));
    }

    fn error(&self, code: XmlParserErrors, msg: impl Into<String>) -> XmlError {
        let domain = if (200..300).contains(&(code as i32)) {
            XmlErrorDomain::XmlFromNamespace
        } else {
            XmlErrorDomain::XmlFromParser
        };
        XmlError::new(domain, code, XmlErrorLevel::XmlErrFatal, msg.into()).with_location(
            self.system_id.as_deref(),
            self.line,
            self.col,
        )
    }

    fn fatal<T>(&mut self, code: XmlParserErrors, msg: impl Into<String>) -> Result<T, XmlError> {
        let err = self.error(code, msg);
        self.stop();
        Err(err)
    }

    fn warn(&mut self, code: XmlParserErrors, msg: impl Into<String>) {
        let mut err = self.error(code, msg);
        err.level = XmlErrorLevel::XmlErrWarning;
        self.warnings.push(err);
    }

    fn check_chars(&mut self, text: &str) -> Result<(), XmlError> {
        if let Some(c) = text.chars().find(|&c| !xml_is_char(c as u32)) {
            return self.fatal(
                XmlParserErrors::XmlErrInvalidChar,
                format!("Char 0x{:X} out of allowed range", c as u32),
            );
        }
        Ok(())
    }

    fn fill_buffer(&mut self) -> Result<(), XmlError> {
        if self.pos > 0 && (self.pos == self.buf.len() || self.pos > XML_SCAN_SHRINK_THRESHOLD) {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        if let Err(e) = self.decoder.decode(&mut self.buf, self.terminate) {
            let code = if e.malformed() {
                XmlParserErrors::XmlErrInvalidChar
            } else {
                XmlParserErrors::XmlErrInvalidEncoding
            };
            return self.fatal(
                code,
                format!("Input is not proper {}: {e}", self.decoder.encoding_name()),
            );
        }
        Ok(())
    }

    /// Recognize one construct.
    ///
    /// Returns `Ok(false)` if more input is needed to make progress.
    fn scan_one(&mut self, handler: &mut dyn XmlScanHandler) -> Result<bool, XmlError> {
        match self.phase {
            XmlScanPhase::Start => self.scan_start(handler),
            XmlScanPhase::Prolog | XmlScanPhase::Epilog => self.scan_misc(),
            XmlScanPhase::Subset => self.scan_subset(),
            XmlScanPhase::Content => self.scan_content(),
            XmlScanPhase::Done => Ok(false),
        }
    }

    fn scan_start(&mut self, handler: &mut dyn XmlScanHandler) -> Result<bool, XmlError> {
        if self.mode == XmlScanMode::Document && !self.started {
            self.started = true;
            self.queue(XmlScanEvent::StartDocument);
            return Ok(true);
        }
        let rest = self.rest();
        let decl = rest.len() > 5
            && rest.starts_with("<?xml")
            && xml_is_blank_char(rest.as_bytes()[5] as u32);
        if !decl && rest.len() <= 5 && "<?xml".starts_with(rest) && !self.at_eof() {
            return Ok(false);
        }
        if decl {
            if !self.scan_xml_decl(handler)? {
                return Ok(false);
            }
        } else {
            self.decoder.end_declaration(None);
        }
        self.phase = match self.mode {
            XmlScanMode::Document => XmlScanPhase::Prolog,
            XmlScanMode::Content => XmlScanPhase::Content,
            XmlScanMode::Dtd => XmlScanPhase::Subset,
        };
        Ok(true)
    }

    fn skip_blanks(&mut self) -> bool {
        let n = self
            .rest()
            .bytes()
            .take_while(|&b| xml_is_blank_char(b as u32))
            .count();
        self.advance(n);
        n > 0
    }

    /// Prolog and epilog: comments, PIs, whitespace, the DOCTYPE and the root.
    fn scan_misc(&mut self) -> Result<bool, XmlError> {
        if self.skip_blanks() {
            return Ok(true);
        }
        let rest = self.rest();
        if rest.is_empty() {
            return Ok(false);
        }
        if rest.starts_with("<?") {
            return self.scan_pi();
        }
        if rest.starts_with("<!--") {
            return self.scan_comment();
        }
        if rest.len() < 9
            && ("<!DOCTYPE".starts_with(rest) || "<!--".starts_with(rest))
            && !self.at_eof()
        {
            return Ok(false);
        }
        if rest.starts_with("<!DOCTYPE") {
            if self.seen_doctype || self.phase == XmlScanPhase::Epilog {
                return self.fatal(
                    XmlParserErrors::XmlErrDocumentEnd,
                    "DOCTYPE improperly placed",
                );
            }
            return self.scan_doctype();
        }
        if rest.starts_with('<') && rest[1..].starts_with(|c: char| xml_is_name_start_char(c)) {
            if self.phase == XmlScanPhase::Epilog {
                return self.fatal(
                    XmlParserErrors::XmlErrDocumentEnd,
                    "Extra content at the end of the document",
                );
            }
            return self.scan_start_tag();
        }
        if self.phase == XmlScanPhase::Epilog {
            self.fatal(
                XmlParserErrors::XmlErrDocumentEnd,
                "Extra content at the end of the document",
            )
        } else {
            self.fatal(
                XmlParserErrors::XmlErrDocumentStart,
                "Start tag expected, '<' not found",
            )
        }
    }

    fn scan_content(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(&first) = rest.as_bytes().first() else {
            return Ok(false);
        };
        match first {
            b'<' => {
                let bytes = rest.as_bytes();
                if bytes.len() < 2 {
                    return Ok(false);
                }
                match bytes[1] {
                    b'/' => self.scan_end_tag(),
                    b'?' => self.scan_pi(),
                    b'!' => {
                        if rest.starts_with("<!--") {
                            self.scan_comment()
                        } else if rest.starts_with("<![CDATA[") {
                            self.scan_cdata()
                        } else if rest.len() < 9
                            && ("<![CDATA[".starts_with(rest) || "<!--".starts_with(rest))
                            && !self.at_eof()
                        {
                            Ok(false)
                        } else {
                            self.fatal(
                                XmlParserErrors::XmlErrNameRequired,
                                "StartTag: invalid element name",
                            )
                        }
                    }
                    _ => self.scan_start_tag(),
                }
            }
            b'&' => self.scan_reference(),
            _ => self.scan_text(),
        }
    }

    fn scan_text(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let end = match memchr2(b'<', b'&', rest.as_bytes()) {
            Some(end) => end,
            None if self.at_eof() => rest.len(),
            None => {
                // keep a trailing "]]" until we know whether '>' follows
                let held = rest.len() - rest.trim_end_matches(']').len();
                rest.len() - held.min(2)
            }
        };
        if end == 0 {
            return Ok(false);
        }
        let text = rest[..end].to_owned();
        if memmem::find(text.as_bytes(), b"]]>").is_some() {
            return self.fatal(
                XmlParserErrors::XmlErrMisplacedCDATAEnd,
                "Sequence ']]>' not allowed in content",
            );
        }
        self.check_chars(&text)?;
        self.queue(XmlScanEvent::Characters(text));
        self.advance(end);
        Ok(true)
    }

    /// Parse a character reference at the start of `s`.
    ///
    /// Returns the character and the length of the reference, `Ok(None)` if
    /// `s` is incomplete.
    fn parse_char_ref(&mut self, s: &str) -> Result<Option<(char, usize)>, XmlError> {
        let Some(semi) = memchr(b';', s.as_bytes()) else {
            if s.len() > 12 || self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrInvalidCharRef,
                    "CharRef: invalid decimal value",
                );
            }
            return Ok(None);
        };
        let (digits, radix, code) = match s[2..semi].strip_prefix('x') {
            Some(hex) => (hex, 16, XmlParserErrors::XmlErrInvalidHexCharRef),
            None => (&s[2..semi], 10, XmlParserErrors::XmlErrInvalidDecCharRef),
        };
        let valid_digits = !digits.is_empty()
            && digits.bytes().all(|b| {
                if radix == 16 {
                    b.is_ascii_hexdigit()
                } else {
                    b.is_ascii_digit()
                }
            });
        if !valid_digits {
            return self.fatal(code, "CharRef: invalid value");
        }
        match u32::from_str_radix(digits, radix)
            .ok()
            .filter(|&c| xml_is_char(c))
            .and_then(char::from_u32)
        {
            Some(c) => Ok(Some((c, semi + 1))),
            None => self.fatal(
                XmlParserErrors::XmlErrInvalidCharRef,
                format!("xmlParseCharRef: invalid xmlChar value {digits}"),
            ),
        }
    }

    /// Parse `&name;` at the start of `s`.
    ///
    /// Returns the name and the length of the reference, `Ok(None)` if `s`
    /// is incomplete.
    fn parse_entity_ref<'a>(&mut self, s: &'a str) -> Result<Option<(&'a str, usize)>, XmlError> {
        let len = name_len(&s[1..]);
        if len == 0 {
            if s.len() == 1 && !self.at_eof() {
                return Ok(None);
            }
            return self.fatal(
                XmlParserErrors::XmlErrEntityRefNoName,
                "xmlParseEntityRef: no name",
            );
        }
        match s.as_bytes().get(1 + len) {
            Some(b';') => Ok(Some((&s[1..1 + len], len + 2))),
            None if !self.at_eof() => Ok(None),
            _ => self.fatal(
                XmlParserErrors::XmlErrEntityRefSemicolMissing,
                format!("EntityRef: expecting ';' after '{}'", &s[1..1 + len]),
            ),
        }
    }

    fn scan_reference(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let end = memchr(b';', rest.as_bytes()).map_or(rest.len(), |i| i + 1);
        let rest = rest[..end].to_owned();
        if rest.starts_with("&#") {
            let Some((c, len)) = self.parse_char_ref(&rest)? else {
                return Ok(false);
            };
            self.queue(XmlScanEvent::Characters(c.to_string()));
            self.advance(len);
            return Ok(true);
        }
        if rest.len() == 1 && !self.at_eof() {
            return Ok(false);
        }
        let Some((name, len)) = self.parse_entity_ref(&rest)? else {
            return Ok(false);
        };
        match xml_get_predefined_entity(name) {
            Some(text) => self.queue(XmlScanEvent::Characters(text.to_owned())),
            None => self.queue(XmlScanEvent::EntityReference {
                name: name.to_owned(),
                is_parameter: false,
            }),
        }
        self.advance(len);
        Ok(true)
    }

    fn scan_comment(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(end) = memmem::find(&rest.as_bytes()[4..], b"--") else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrCommentNotFinished,
                    "Comment not terminated",
                );
            }
            return Ok(false);
        };
        let end = end + 4;
        match rest.as_bytes().get(end + 2) {
            Some(b'>') => {}
            None if !self.at_eof() => return Ok(false),
            _ => {
                return self.fatal(
                    XmlParserErrors::XmlErrHyphenInComment,
                    "Double hyphen within comment",
                );
            }
        }
        let text = rest[4..end].to_owned();
        self.check_chars(&text)?;
        self.queue(XmlScanEvent::Comment(text));
        self.advance(end + 3);
        Ok(true)
    }

    /// ```text
    /// [16] PI       ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
    /// [17] PITarget ::= Name - (('X' | 'x') ('M' | 'm') ('L' | 'l'))
    /// ```
    fn scan_pi(&mut self) -> Result<bool, XmlError> {
        let rest = self.rest();
        let Some(end) = memmem::find(&rest.as_bytes()[2..], b"?>") else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrPINotFinished,
                    "PI not terminated",
                );
            }
            return Ok(false);
        };
        let body = rest[2..end + 2].to_owned();
        let len = name_len(&body);
        if len == 0 {
            return self.fatal(
                XmlParserErrors::XmlErrPINotStarted,
                "xmlParsePI : no target name",
            );
        }
        let target = &body[..len];
        if target.eq_ignore_ascii_case("xml") {
            return self.fatal(
                XmlParserErrors::XmlErrReservedXmlName,
                "XML declaration allowed only at the start of the document",
            );
        }
        if target.contains(':') {
            return self.fatal(
                XmlParserErrors::XmlNsErrColon,
                format!("colons are forbidden from PI names '{target}'"),
            );
        }
        let data = &body[len..];
        if !data.is_empty() && !data.starts_with(|c: char| xml_is_blank_char(c as u32)) {
            return self.fatal(
                XmlParserErrors::XmlErrSpaceRequired,
                "ParsePI: PI xml space expected",
            );
        }
        let data = data.trim_start_matches(|c: char| xml_is_blank_char(c as u32));
        self.check_chars(data)?;
        let event = XmlScanEvent::ProcessingInstruction {
            target: target.to_owned(),
            data: (!data.is_empty()).then(|| data.to_owned()),
        };
        self.queue(event);
        self.advance(end + 4);
        Ok(true)
    }

    fn scan_cdata(&mut self) -> Result<bool, XmlError> {
        const START: usize = "<![CDATA[".len();
        let rest = self.rest();
        let Some(end) = memmem::find(&rest.as_bytes()[START..], b"]]>") else {
            if self.at_eof() {
                return self.fatal(
                    XmlParserErrors::XmlErrCDATANotFinished,
                    "CData section not finished",
                );
            }
            return Ok(false);
        };
        let text = rest[START..START + end].to_owned();
        self.check_chars(&text)?;
        self.queue(XmlScanEvent::StartCData);
        if !text.is_empty() {
            self.queue(XmlScanEvent::Characters(text));
        }
        self.advance(START + end + 3);
        self.queue(XmlScanEvent::EndCData);
        Ok(true)
    }

    /// Report what remains once the input is exhausted.
    fn scan_eof(&mut self) -> Result<(), XmlError> {
        let rest = self.rest();
        if !rest.is_empty() {
            let (code, msg) = if rest.starts_with("<!--") {
                (XmlParserErrors::XmlErrCommentNotFinished, "Comment not terminated")
            } else if rest.starts_with("<?") {
                (XmlParserErrors::XmlErrPINotFinished, "PI not terminated")
            } else if rest.starts_with("<![CDATA[") {
                (XmlParserErrors::XmlErrCDATANotFinished, "CData section not finished")
            } else if rest.starts_with('&') {
                (
                    XmlParserErrors::XmlErrEntityRefSemicolMissing,
                    "EntityRef: expecting ';'",
                )
            } else if self.phase == XmlScanPhase::Subset {
                (
                    XmlParserErrors::XmlErrExtSubsetNotFinished,
                    "Content error in the external subset",
                )
            } else {
                (
                    XmlParserErrors::XmlErrGtRequired,
                    "Couldn't find end of Start Tag",
                )
            };
            return self.fatal(code, msg);
        }
        match self.phase {
            XmlScanPhase::Start | XmlScanPhase::Prolog if self.mode == XmlScanMode::Document => {
                return self.fatal(XmlParserErrors::XmlErrDocumentEmpty, "Document is empty");
            }
            XmlScanPhase::Subset if self.in_internal_subset => {
                return self.fatal(
                    XmlParserErrors::XmlErrDoctypeNotFinished,
                    "DOCTYPE improperly terminated",
                );
            }
            XmlScanPhase::Subset if self.cond_depth > 0 => {
                return self.fatal(
                    XmlParserErrors::XmlErrCondsecNotFinished,
                    "XML conditional section not closed",
                );
            }
            _ => {}
        }
        if let Some(tag) = self.tags.last() {
            let (code, msg) = if self.mode == XmlScanMode::Document {
                (
                    XmlParserErrors::XmlErrTagNotFinished,
                    format!("Premature end of data in tag {} line {}", tag.qname, tag.line),
                )
            } else {
                (
                    XmlParserErrors::XmlErrNotWellBalanced,
                    format!("chunk is not well balanced: {} is not closed", tag.qname),
                )
            };
            return self.fatal(code, msg);
        }
        if self.mode == XmlScanMode::Document {
            self.queue(XmlScanEvent::EndDocument);
        }
        self.phase = XmlScanPhase::Done;
        Ok(())
    }
}

impl XmlScanner for XmlTextScanner {
    fn feed(&mut self, chunk: &[u8], terminate: bool) {
        self.decoder.feed(chunk);
        self.terminate |= terminate;
    }

    fn resume(&mut self, handler: &mut dyn XmlScanHandler) -> Result<XmlScanStatus, XmlError> {
        if matches!(self.status, XmlScanStatus::Stopped | XmlScanStatus::Finished) {
            return Ok(self.status);
        }
        self.status = XmlScanStatus::Parsing;
        loop {
            for warning in std::mem::take(&mut self.warnings) {
                if handler.warning(warning) == XmlScanControl::Stop {
                    self.stop();
                    return Ok(XmlScanStatus::Stopped);
                }
            }
            while let Some((event, line, col)) = self.queue.pop_front() {
                let loc = XmlSAXLocator {
                    system_id: self.system_id.clone(),
                    line,
                    col,
                };
                match handler.process_event(&event, &loc) {
                    XmlScanControl::Continue => {}
                    XmlScanControl::Suspend => {
                        self.status = XmlScanStatus::Suspended;
                        return Ok(self.status);
                    }
                    XmlScanControl::Stop => {
                        self.stop();
                        return Ok(XmlScanStatus::Stopped);
                    }
                }
            }
            if self.phase == XmlScanPhase::Done {
                self.status = XmlScanStatus::Finished;
                return Ok(self.status);
            }
            self.fill_buffer()?;
            if !self.scan_one(handler)? {
                if !self.at_eof() {
                    return Ok(XmlScanStatus::Parsing);
                }
                if self.decoder.declaration_pending() {
                    // the declaration was never completed
                    self.decoder.end_declaration(None);
                    continue;
                }
                self.scan_eof()?;
            }
        }
    }

    fn stop(&mut self) {
        self.status = XmlScanStatus::Stopped;
        self.queue.clear();
        self.warnings.clear();
    }

    fn status(&self) -> XmlScanStatus {
        self.status
    }

    fn locator(&self) -> XmlSAXLocator {
        XmlSAXLocator {
            system_id: self.system_id.clone(),
            line: self.line,
            col: self.col,
        }
    }

    fn create_entity_scanner(
        &self,
        mode: XmlScanMode,
        input: XmlEntityInput,
    ) -> Box<dyn XmlScanner> {
        let decls = match mode {
            XmlScanMode::Document => Rc::default(),
            _ => self.decls.clone(),
        };
        let mut scanner = XmlTextScanner::with_decls(mode, input, decls);
        if mode == XmlScanMode::Content {
            scanner.ns = self.ns.clone();
        }
        Box::new(scanner)
    }
}

/// The length of the `Name` at the start of `s`.
pub(crate) fn name_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if xml_is_name_start_char(c) => {}
        _ => return 0,
    }
    chars
        .find(|&(_, c)| !xml_is_name_char(c))
        .map_or(s.len(), |(i, _)| i)
}

/// Find the first byte of `targets` that is not inside a quoted literal.
pub(crate) fn find_unquoted(s: &[u8], targets: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in s.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if targets.contains(&b) => return Some(i),
            None => {}
        }
    }
    None
}

/// Collapse the whitespace of a tokenized attribute value.
pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn is_reserved_xml_binding(prefix: Option<&str>, uri: &str) -> bool {
    prefix == Some("xml") && uri == XML_XML_NAMESPACE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<XmlScanEvent>,
        suspend_every: bool,
    }

    impl XmlScanHandler for Recorder {
        fn process_event(&mut self, event: &XmlScanEvent, _: &XmlSAXLocator) -> XmlScanControl {
            self.events.push(event.clone());
            if self.suspend_every {
                XmlScanControl::Suspend
            } else {
                XmlScanControl::Continue
            }
        }
    }

    fn scan(chunks: &[&str]) -> Result<Vec<XmlScanEvent>, XmlError> {
        let mut scanner = XmlTextScanner::new(None);
        let mut recorder = Recorder::default();
        for (i, chunk) in chunks.iter().enumerate() {
            scanner.parse(&mut recorder, chunk.as_bytes(), i + 1 == chunks.len())?;
        }
        Ok(recorder.events)
    }

    fn text_of(events: &[XmlScanEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                XmlScanEvent::Characters(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn simple_document() {
        let events = scan(&["<?xml version='1.0'?><a x='1'>hi &amp; <b/></a>"]).unwrap();
        assert_eq!(events[0], XmlScanEvent::StartDocument);
        assert!(matches!(events[1], XmlScanEvent::XmlDecl { .. }));
        assert!(matches!(
            &events[2],
            XmlScanEvent::StartElement { name, attributes } if name == "a" && attributes[0].value == "1"
        ));
        assert_eq!(text_of(&events), "hi & ");
        assert_eq!(events.last(), Some(&XmlScanEvent::EndDocument));
    }

    #[test]
    fn constructs_split_across_chunks() {
        let doc = "<root><!-- note --><?pi data?><x a=\"&#65;\">t]t</x><![CDATA[<&>]]></root>";
        let whole = scan(&[doc]).unwrap();
        let chunks: Vec<String> = doc.chars().map(|c| c.to_string()).collect();
        let chunks: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
        let split = scan(&chunks).unwrap();
        assert_eq!(text_of(&whole), text_of(&split));
        let structural = |events: &[XmlScanEvent]| {
            events
                .iter()
                .filter(|e| !matches!(e, XmlScanEvent::Characters(_)))
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(structural(&whole), structural(&split));
    }

    #[test]
    fn namespaces_are_encoded() {
        let events = scan(&["<p:a xmlns:p='urn:p' p:x='1' y='2'/>"]).unwrap();
        assert_eq!(
            events[1],
            XmlScanEvent::StartNamespaceDecl {
                prefix: Some("p".to_owned()),
                uri: "urn:p".to_owned()
            }
        );
        let XmlScanEvent::StartElement { name, attributes } = &events[2] else {
            panic!("{:?}", events[2]);
        };
        assert_eq!(name, "urn:p\u{C}a\u{C}p");
        assert_eq!(attributes[0].name, "urn:p\u{C}x\u{C}p");
        assert_eq!(attributes[1].name, "y");
    }

    #[test]
    fn well_formedness_errors_are_fatal() {
        let cases = [
            ("<a></b>", XmlParserErrors::XmlErrTagNameMismatch),
            ("<a x='1' x='2'/>", XmlParserErrors::XmlErrAttributeRedefined),
            ("<a><!-- a -- b --></a>", XmlParserErrors::XmlErrHyphenInComment),
            ("<a>]]></a>", XmlParserErrors::XmlErrMisplacedCDATAEnd),
            ("<a/><b/>", XmlParserErrors::XmlErrDocumentEnd),
            ("<p:a/>", XmlParserErrors::XmlNsErrUndefinedNamespace),
            ("<a>", XmlParserErrors::XmlErrTagNotFinished),
            ("", XmlParserErrors::XmlErrDocumentEmpty),
            ("<a>&#0;</a>", XmlParserErrors::XmlErrInvalidCharRef),
        ];
        for (doc, code) in cases {
            let err = scan(&[doc]).unwrap_err();
            assert_eq!(err.code, code, "{doc}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn suspend_keeps_position() {
        let mut scanner = XmlTextScanner::new(None);
        let mut recorder = Recorder {
            suspend_every: true,
            ..Default::default()
        };
        let mut status = scanner
            .parse(&mut recorder, b"<a xmlns='urn:x'>t</a>", true)
            .unwrap();
        let mut rounds = 1;
        while status == XmlScanStatus::Suspended {
            status = scanner.resume(&mut recorder).unwrap();
            rounds += 1;
        }
        assert_eq!(status, XmlScanStatus::Finished);
        // one suspension per event, plus the final call
        assert_eq!(rounds, recorder.events.len() + 1);
    }

    #[test]
    fn attribute_defaults_and_normalization() {
        let doc = "<!DOCTYPE a [<!ATTLIST a t NMTOKENS #IMPLIED d CDATA 'def'>]><a t='  x   y '/>";
        let events = scan(&[doc]).unwrap();
        let attributes = events
            .iter()
            .find_map(|e| match e {
                XmlScanEvent::StartElement { attributes, .. } => Some(attributes.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(attributes[0].value, "x y");
        assert!(attributes[0].specified);
        assert_eq!(attributes[1].name, "d");
        assert_eq!(attributes[1].value, "def");
        assert!(!attributes[1].specified);
    }

    #[test]
    fn line_and_column() {
        let mut scanner = XmlTextScanner::new(Some("doc.xml"));
        let mut recorder = Recorder::default();
        let err = scanner
            .parse(&mut recorder, b"<a>\n  <b></c>\n</a>", true)
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.col, 6);
        assert_eq!(err.file.as_deref(), Some("doc.xml"));
    }
}
