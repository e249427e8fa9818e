//! The driver of the reader.
//!
//! [`XmlReader`] owns the engine core and one scanner per context on the
//! stack. When the core asks for a new context, the scanner on top creates a
//! nested scanner for it; when a nested scanner finishes, its context is
//! popped and the parent scanner resumes where it suspended.

use std::{collections::VecDeque, fs, path::Path};

use crate::{
    dict::XmlDict,
    dtd::{XmlDtd, XmlDtdState},
    encoding::{CustomEncodingHandler, EncodingError},
    error::{
        XmlDiagnostics, XmlError, XmlErrorDomain, XmlErrorHandler, XmlErrorLevel,
        XmlParserErrors,
    },
};

use super::{
    XmlParseStatus,
    context::{XmlContextKind, XmlParseContext, XmlParserCtxt},
    entity::XmlEntityResolver,
    filter::{XmlEvent, XmlEventCollector, XmlFilter},
    sax::{XmlScanStatus, XmlScanner},
    scan::XmlTextScanner,
    strip::XmlWhitespaceRules,
};

/// Reads documents and reports their content to a chain of filters.
///
/// ```
/// use exml_reader::parser::{XmlEventCollector, XmlReader};
///
/// let events = XmlEventCollector::new();
/// let mut reader = XmlReader::new();
/// reader.add_handler(events.clone());
/// reader.parse_bytes(None, b"<doc>hello</doc>").unwrap();
/// assert_eq!(events.len(), 5);
/// ```
pub struct XmlReader {
    ctxt: XmlParserCtxt,
    // one scanner per context, innermost last
    scanners: Vec<Box<dyn XmlScanner>>,
    // the scanner of the next document, if not the built-in one
    root_scanner: Option<Box<dyn XmlScanner>>,
    // URI of the next document
    document_uri: Option<String>,
    started: bool,
    finished: bool,
}

impl Default for XmlReader {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlReader {
    pub fn new() -> Self {
        Self::with_options(0)
    }

    /// Build a reader with a combination of [`super::XmlParserOption`] bits.
    pub fn with_options(options: i32) -> Self {
        Self {
            ctxt: XmlParserCtxt::new(options),
            scanners: vec![],
            root_scanner: None,
            document_uri: None,
            started: false,
            finished: false,
        }
    }

    pub fn options(&self) -> i32 {
        self.ctxt.options
    }

    pub fn set_whitespace_rules(&mut self, rules: XmlWhitespaceRules) {
        self.ctxt.strip = rules;
    }

    /// Receive warnings and errors instead of logging them.
    ///
    /// Without a handler, the first error stops the parse.
    pub fn set_error_handler(&mut self, handler: impl XmlErrorHandler + 'static) {
        self.ctxt.diag.set_handler(Some(Box::new(handler)));
    }

    pub fn set_entity_resolver(&mut self, resolver: impl XmlEntityResolver + 'static) {
        self.ctxt.resolver = Box::new(resolver);
    }

    /// Scan the next document with `scanner` instead of the built-in one.
    pub fn set_scanner(&mut self, scanner: Box<dyn XmlScanner>) {
        self.root_scanner = Some(scanner);
    }

    /// Append a filter to the chain.
    pub fn add_filter(&mut self, filter: impl XmlFilter + 'static) {
        self.ctxt.filters.add(Box::new(filter));
    }

    /// Append a terminal handler: no filter added after it is reached.
    pub fn add_handler(&mut self, handler: impl XmlFilter + 'static) {
        self.ctxt.filters.add_handler(Box::new(handler));
    }

    /// Make an encoding available to documents that declare it.
    pub fn register_encoding(&mut self, handler: CustomEncodingHandler) -> Result<(), EncodingError> {
        self.ctxt.encodings.register(handler)
    }

    /// Make `alias` another name of a registered encoding.
    pub fn add_encoding_alias(&mut self, name: &str, alias: &str) {
        self.ctxt.encodings.add_alias(name, alias);
    }

    /// Share a dictionary with another reader.
    pub fn set_dict(&mut self, dict: XmlDict) {
        self.ctxt.dict = dict;
    }

    pub fn into_dict(self) -> XmlDict {
        self.ctxt.dict
    }

    /// Set the URI of the next document, used as its base URI.
    pub fn set_document_uri(&mut self, uri: Option<&str>) {
        self.document_uri = uri.map(|s| s.to_owned());
    }

    /// Suspend after each event.
    pub fn set_step_mode(&mut self, step: bool) {
        self.ctxt.step_mode = step;
    }

    pub fn context(&self) -> &XmlParserCtxt {
        &self.ctxt
    }

    pub fn diagnostics(&self) -> &XmlDiagnostics {
        &self.ctxt.diag
    }

    pub fn dtd(&self) -> Option<&XmlDtd> {
        self.ctxt.dtd.as_ref()
    }

    /// Where the current document stands with respect to its DTD.
    pub fn dtd_state(&self) -> XmlDtdState {
        self.ctxt
            .dtd
            .as_ref()
            .map_or(XmlDtdState::NoDTD, |dtd| dtd.state())
    }

    /// The number of filters that have not been detached.
    pub fn active_filters(&self) -> usize {
        self.ctxt.filters.active()
    }

    fn start(&mut self) {
        self.ctxt.reset();
        let uri = self.document_uri.take();
        let scanner = self
            .root_scanner
            .take()
            .unwrap_or_else(|| Box::new(XmlTextScanner::new(uri.as_deref())));
        self.scanners = vec![scanner];
        self.ctxt.context_push(XmlParseContext::new(
            XmlContextKind::Document,
            None,
            uri.as_deref(),
        ));
        self.started = true;
        self.finished = false;
    }

    /// Parse a chunk of a document.
    ///
    /// `terminate` marks the last chunk. After the document is finished, the
    /// next call starts a new one. A stopped parse stays stopped until
    /// [`XmlReader::reset`].
    #[doc(alias = "xmlParseChunk")]
    pub fn parse_chunk(
        &mut self,
        chunk: &[u8],
        terminate: bool,
    ) -> Result<XmlParseStatus, XmlError> {
        if self.started && self.ctxt.stopped {
            return Ok(XmlParseStatus::Stopped);
        }
        if !self.started || self.finished {
            self.start();
        }
        if let Some(root) = self.scanners.first_mut() {
            root.feed(chunk, terminate);
        }
        self.run()
    }

    /// Continue a suspended parse.
    #[doc(alias = "xmlResumeParser")]
    pub fn resume(&mut self) -> Result<XmlParseStatus, XmlError> {
        if !self.started {
            return Ok(XmlParseStatus::Parsing);
        }
        if self.finished {
            return Ok(if self.ctxt.stopped {
                XmlParseStatus::Stopped
            } else {
                XmlParseStatus::Finished
            });
        }
        self.run()
    }

    /// Abort the parse. No further event is reported.
    #[doc(alias = "xmlStopParser")]
    pub fn stop(&mut self) {
        self.stop_all();
    }

    /// Forget the current parse. The next chunk starts a new document.
    #[doc(alias = "xmlCtxtReset")]
    pub fn reset(&mut self) {
        self.stop_all();
        self.started = false;
    }

    /// Parse a complete document held in memory.
    pub fn parse_bytes(&mut self, uri: Option<&str>, bytes: &[u8]) -> Result<(), XmlError> {
        self.started = false;
        self.set_document_uri(uri);
        let mut status = self.parse_chunk(bytes, true)?;
        while status == XmlParseStatus::Suspended {
            status = self.resume()?;
        }
        Ok(())
    }

    /// Parse the document in the file at `path`.
    #[doc(alias = "xmlReadFile")]
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), XmlError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| {
            let file = path.display().to_string();
            XmlError::new(
                XmlErrorDomain::XmlFromIO,
                XmlParserErrors::XmlIOLoadError,
                XmlErrorLevel::XmlErrFatal,
                format!("failed to load \"{file}\": {err}"),
            )
            .with_params(Some(&file), None, None)
        })?;
        let uri = path.to_string_lossy().into_owned();
        self.parse_bytes(Some(&uri), &bytes)
    }

    /// Read `bytes` one event at a time.
    pub fn events(mut self, bytes: impl Into<Vec<u8>>) -> XmlEventReader {
        let collector = XmlEventCollector::new();
        self.started = false;
        self.add_filter(collector.clone());
        self.set_step_mode(true);
        XmlEventReader {
            reader: self,
            collector,
            input: Some(bytes.into()),
            queue: VecDeque::new(),
            error: None,
            done: false,
        }
    }

    fn stop_all(&mut self) {
        for scanner in self.scanners.iter_mut() {
            scanner.stop();
        }
        self.scanners.clear();
        self.ctxt.stopped = true;
        self.finished = true;
    }

    /// Stop everything because of `error`.
    fn abort(&mut self, error: XmlError) -> XmlError {
        self.stop_all();
        error
    }

    /// Run the scanners until input runs out, the parse is suspended or it
    /// ends.
    fn run(&mut self) -> Result<XmlParseStatus, XmlError> {
        loop {
            if self.finished {
                return Ok(if self.ctxt.stopped {
                    XmlParseStatus::Stopped
                } else {
                    XmlParseStatus::Finished
                });
            }
            let Some(scanner) = self.scanners.last_mut() else {
                self.finished = true;
                return Ok(XmlParseStatus::Finished);
            };
            let status = match scanner.resume(&mut self.ctxt) {
                Ok(status) => status,
                Err(error) => {
                    // well-formedness errors are reported once, here
                    let error = match self.ctxt.diag.report(error) {
                        Ok(()) => self.ctxt.diag.last_error().cloned(),
                        Err(error) => Some(error),
                    };
                    let error = error.unwrap_or_else(|| {
                        XmlError::new(
                            XmlErrorDomain::XmlFromParser,
                            XmlParserErrors::XmlErrInternalError,
                            XmlErrorLevel::XmlErrFatal,
                            "the scanner failed".to_owned(),
                        )
                    });
                    return Err(self.abort(error));
                }
            };
            if let Some(fatal) = self.ctxt.fatal.take() {
                return Err(self.abort(fatal));
            }
            if let Some(pending) = self.ctxt.pending.take() {
                let mut child = scanner.create_entity_scanner(pending.mode, pending.input);
                child.feed(&pending.bytes, true);
                self.ctxt.context_push(pending.context);
                self.scanners.push(child);
                if std::mem::take(&mut self.ctxt.suspend_requested) {
                    return Ok(XmlParseStatus::Suspended);
                }
                continue;
            }
            match status {
                XmlScanStatus::Finished if self.scanners.len() > 1 => {
                    self.scanners.pop();
                    self.ctxt.end_context();
                    if let Some(fatal) = self.ctxt.fatal.take() {
                        return Err(self.abort(fatal));
                    }
                }
                XmlScanStatus::Finished => {
                    self.finished = true;
                    log::debug!(
                        "document finished with {} errors and {} warnings",
                        self.ctxt.diag.nb_errors(),
                        self.ctxt.diag.nb_warnings()
                    );
                    return Ok(XmlParseStatus::Finished);
                }
                XmlScanStatus::Suspended => {
                    if std::mem::take(&mut self.ctxt.suspend_requested) {
                        return Ok(XmlParseStatus::Suspended);
                    }
                }
                XmlScanStatus::Parsing => return Ok(XmlParseStatus::Parsing),
                XmlScanStatus::Stopped => {
                    self.stop_all();
                    return Ok(XmlParseStatus::Stopped);
                }
            }
        }
    }
}

/// The events of one document, produced on demand.
///
/// The parse advances by one scanner event per step, so only the events
/// not yet consumed are held in memory.
pub struct XmlEventReader {
    reader: XmlReader,
    collector: XmlEventCollector,
    input: Option<Vec<u8>>,
    queue: VecDeque<XmlEvent>,
    error: Option<XmlError>,
    done: bool,
}

impl XmlEventReader {
    /// The reader, for its diagnostics and DTD.
    pub fn reader(&self) -> &XmlReader {
        &self.reader
    }
}

impl Iterator for XmlEventReader {
    type Item = Result<XmlEvent, XmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if let Some(error) = self.error.take() {
                return Some(Err(error));
            }
            if self.done {
                return None;
            }
            let status = match self.input.take() {
                Some(bytes) => self.reader.parse_chunk(&bytes, true),
                None => self.reader.resume(),
            };
            self.queue.extend(self.collector.take());
            match status {
                Ok(XmlParseStatus::Suspended) => {}
                Ok(_) => self.done = true,
                Err(error) => {
                    self.error = Some(error);
                    self.done = true;
                }
            }
        }
    }
}
