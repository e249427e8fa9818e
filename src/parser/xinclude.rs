//! XInclude processing on the event stream.
//!
//! An `xi:include` element is replaced by the resource it points to. With
//! `parse="xml"` the resource is read in a new context whose events flow in
//! place of the element; with `parse="text"` it becomes character data. If
//! the resource cannot be loaded, the content of the `xi:fallback` child is
//! used instead. The `xi:include` and `xi:fallback` elements themselves are
//! never dispatched.

use std::rc::Rc;

use crate::{
    XINCLUDE_NS, XINCLUDE_OLD_NS,
    chvalid::xml_is_char,
    dict::ExpandedName,
    encoding::find_encoding_handler,
    error::{XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
    uri::{XmlURI, build_uri},
};

use super::{
    XmlParserCtxt, XmlParserOption,
    context::XmlContextKind,
    filter::{XmlAttribute, XmlEvent},
    sax::{XmlEntityInput, XmlScanMode},
};

const XINCLUDE_NODE: &str = "include";
const XINCLUDE_FALLBACK: &str = "fallback";
const XINCLUDE_HREF: &str = "href";
const XINCLUDE_PARSE: &str = "parse";
const XINCLUDE_PARSE_ENCODING: &str = "encoding";
const XINCLUDE_PARSE_XPOINTER: &str = "xpointer";

/// An `xi:include` element that is open.
#[derive(Debug)]
struct XmlIncludeFrame {
    /// The depth of the `xi:include` element.
    depth: usize,
    /// The number of contexts when the element was read.
    context: usize,
    resolved: bool,
    /// An `xi:fallback` child was seen.
    fallback: bool,
    /// Why the resource could not be loaded.
    failure: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct XmlXIncludeCtxt {
    includes: Vec<XmlIncludeFrame>,
    /// Everything is dropped until the element at this depth ends.
    skip_until: Option<usize>,
}

/// What to do with a start tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XmlIncludeAction {
    Dispatch,
    /// Track the element without dispatching it.
    Hide,
    /// An `xi:include` element to process once it is on the stack.
    Include,
}

fn is_xinclude(name: &ExpandedName, local: &str) -> bool {
    name.is(Some(XINCLUDE_NS), local) || name.is(Some(XINCLUDE_OLD_NS), local)
}

fn get_prop<'a>(attributes: &'a [XmlAttribute], local: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|attr| attr.name.is(None, local))
        .map(|attr| &*attr.value)
}

impl XmlParserCtxt {
    #[doc(alias = "xmlXIncludeErr")]
    fn xinclude_err(&mut self, code: XmlParserErrors, msg: String, extra: Option<&str>) {
        self.report(
            XmlErrorDomain::XmlFromXInclude,
            code,
            XmlErrorLevel::XmlErrError,
            msg,
            [extra, None, None],
        );
    }

    /// Check if the innermost open element is an `xi:include` of the
    /// current document.
    fn in_include_element(&self) -> bool {
        self.xinclude.includes.last().is_some_and(|frame| {
            frame.depth == self.nodes.len()
                && self
                    .contexts
                    .get(frame.context..)
                    .unwrap_or_default()
                    .iter()
                    .all(|c| c.kind != XmlContextKind::XInclude)
        })
    }

    /// Check if the events at the current position are dropped.
    pub(crate) fn xinclude_skipping(&self) -> bool {
        self.xinclude.skip_until.is_some() || self.in_include_element()
    }

    /// Classify a start tag before the element is pushed.
    pub(crate) fn xinclude_start_element(&mut self, name: &ExpandedName) -> XmlIncludeAction {
        if !self.has_option(XmlParserOption::XmlParseXInclude) {
            return XmlIncludeAction::Dispatch;
        }
        if self.xinclude.skip_until.is_some() {
            return XmlIncludeAction::Hide;
        }
        let depth = self.nodes.len() + 1;
        if self.in_include_element() {
            let is_fallback = is_xinclude(name, XINCLUDE_FALLBACK);
            let (resolved, seen) = self
                .xinclude
                .includes
                .last()
                .map_or((false, false), |frame| (frame.resolved, frame.fallback));
            if is_fallback && !resolved && !seen {
                if let Some(frame) = self.xinclude.includes.last_mut() {
                    frame.fallback = true;
                }
                return XmlIncludeAction::Hide;
            }
            if is_fallback && seen {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeFallbacksInInclude,
                    "include has multiple fallback children".to_owned(),
                    None,
                );
            } else if is_xinclude(name, XINCLUDE_NODE) {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeIncludeInInclude,
                    "include has an 'include' child".to_owned(),
                    None,
                );
            }
            self.xinclude.skip_until = Some(depth);
            return XmlIncludeAction::Hide;
        }
        if is_xinclude(name, XINCLUDE_FALLBACK) {
            self.xinclude_err(
                XmlParserErrors::XmlXIncludeFallbackNotInInclude,
                "fallback is not the child of an 'include'".to_owned(),
                None,
            );
            self.xinclude.skip_until = Some(depth);
            return XmlIncludeAction::Hide;
        }
        if is_xinclude(name, XINCLUDE_NODE) {
            return XmlIncludeAction::Include;
        }
        XmlIncludeAction::Dispatch
    }

    /// Process the `xi:include` element on top of the open-element stack.
    #[doc(alias = "xmlXIncludeLoadNode")]
    pub(crate) fn xinclude_include(&mut self, attributes: &[XmlAttribute]) {
        let mut frame = XmlIncludeFrame {
            depth: self.nodes.len(),
            context: self.contexts.len(),
            resolved: false,
            fallback: false,
            failure: None,
        };
        match self.xinclude_load(attributes) {
            Ok(()) => frame.resolved = true,
            Err(failure) => frame.failure = failure,
        }
        self.xinclude.includes.push(frame);
    }

    /// Load the resource of an `xi:include`.
    ///
    /// Returns `Err(Some(reason))` if the resource could not be loaded and
    /// `Err(None)` if the element itself is in error, which was reported.
    fn xinclude_load(&mut self, attributes: &[XmlAttribute]) -> Result<(), Option<String>> {
        let href = get_prop(attributes, XINCLUDE_HREF).unwrap_or("").to_owned();
        let text = match get_prop(attributes, XINCLUDE_PARSE).unwrap_or("xml") {
            "xml" => false,
            "text" => true,
            parse => {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeParseValue,
                    format!("invalid value {parse} for 'parse'"),
                    Some(parse),
                );
                return Err(None);
            }
        };
        if let Some(xpointer) = get_prop(attributes, XINCLUDE_PARSE_XPOINTER) {
            let xpointer = xpointer.to_owned();
            self.xinclude_err(
                XmlParserErrors::XmlXIncludeXPtrFailed,
                format!("XPointer evaluation failed: #{xpointer}"),
                Some(&xpointer),
            );
            return Err(None);
        }
        if href.is_empty() {
            self.xinclude_err(
                XmlParserErrors::XmlXIncludeNoHref,
                "detected a local recursion with no xpointer".to_owned(),
                None,
            );
            return Err(None);
        }
        let Some(uri) = XmlURI::parse(&href) else {
            self.xinclude_err(
                XmlParserErrors::XmlXIncludeHrefURI,
                format!("invalid value URI {href}"),
                Some(&href),
            );
            return Err(None);
        };
        if let Some(fragment) = uri.fragment {
            let fragment = fragment.to_owned();
            if text {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeTextFragment,
                    format!("fragment identifier forbidden for text: {fragment}"),
                    Some(&fragment),
                );
            } else {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeHrefURI,
                    format!("Invalid fragment identifier in URI {href} use the xpointer attribute"),
                    Some(&href),
                );
            }
            return Err(None);
        }

        let base = self.in_scope_base();
        let absolute = base
            .as_deref()
            .and_then(|base| build_uri(&href, base))
            .unwrap_or_else(|| href.clone());
        if !text && self.contains_uri(&absolute) {
            self.report(
                XmlErrorDomain::XmlFromXInclude,
                XmlParserErrors::XmlXIncludeRecursion,
                XmlErrorLevel::XmlErrFatal,
                format!("detected a recursion in {absolute}"),
                [Some(&absolute), None, None],
            );
            return Err(None);
        }
        let source = match self.resolver.resolve(None, &href, base.as_deref()) {
            Ok(source) => source,
            Err(err) => return Err(Some(format!("{err:#}"))),
        };
        log::debug!("including {} as {}", source.uri, if text { "text" } else { "xml" });

        if text {
            return self.xinclude_load_text(attributes, &source.uri, source.bytes);
        }
        let context = self.new_context(XmlContextKind::XInclude, None, Some(&source.uri));
        let input = XmlEntityInput {
            system_id: Some(source.uri),
            ..Default::default()
        };
        self.begin_context(context, XmlScanMode::Document, input, source.bytes);
        Ok(())
    }

    #[doc(alias = "xmlXIncludeLoadTxt")]
    fn xinclude_load_text(
        &mut self,
        attributes: &[XmlAttribute],
        uri: &str,
        bytes: Vec<u8>,
    ) -> Result<(), Option<String>> {
        let decoded = match get_prop(attributes, XINCLUDE_PARSE_ENCODING) {
            None => String::from_utf8(bytes).ok(),
            Some(encoding) => {
                let encoding = encoding.to_owned();
                let handler = match find_encoding_handler(&encoding) {
                    Ok(Some(handler)) => Some(handler),
                    _ => self.encodings.find(&encoding),
                };
                let Some(mut handler) = handler else {
                    self.xinclude_err(
                        XmlParserErrors::XmlXIncludeUnknownEncoding,
                        format!("encoding {encoding} not supported"),
                        Some(&encoding),
                    );
                    return Err(None);
                };
                let mut out = String::with_capacity(bytes.len());
                handler.decode(&bytes, &mut out, true).ok().map(|_| out)
            }
        };
        let Some(decoded) = decoded.filter(|text| text.chars().all(|c| xml_is_char(c as u32)))
        else {
            self.xinclude_err(
                XmlParserErrors::XmlXIncludeInvalidChar,
                format!("{uri} contains invalid char"),
                Some(uri),
            );
            return Err(None);
        };
        let text = decoded.replace("\r\n", "\n").replace('\r', "\n");
        if !text.is_empty() {
            self.validate_push_cdata(text.chars().all(|c| c.is_ascii_whitespace()));
            self.dispatch(XmlEvent::Characters(Rc::from(text)));
        }
        Ok(())
    }

    /// Update the inclusion state after the element at `depth` ended.
    pub(crate) fn xinclude_end_element(&mut self, depth: usize) {
        if self.xinclude.skip_until == Some(depth) {
            self.xinclude.skip_until = None;
            return;
        }
        if self.xinclude.skip_until.is_some() {
            return;
        }
        let closes_include = self.xinclude.includes.last().is_some_and(|frame| {
            frame.depth == depth
                && self
                    .contexts
                    .get(frame.context..)
                    .unwrap_or_default()
                    .iter()
                    .all(|c| c.kind != XmlContextKind::XInclude)
        });
        if !closes_include {
            return;
        }
        let Some(frame) = self.xinclude.includes.pop() else {
            return;
        };
        if !frame.resolved && !frame.fallback {
            if let Some(failure) = frame.failure {
                self.xinclude_err(
                    XmlParserErrors::XmlXIncludeNoFallback,
                    format!("could not load the included resource, and no fallback was found: {failure}"),
                    None,
                );
            }
        }
    }
}
