use std::{collections::HashSet, rc::Rc};

use crate::{
    dict::{ExpandedName, XmlAtom, XmlDict},
    dtd::XmlDtd,
    encoding::XmlEncodingRegistry,
    error::{XmlDiagnostics, XmlError},
    uri::build_uri,
};

use super::{
    XmlParserOption,
    buffer::XmlCharBuffer,
    entity::{XmlEntityResolver, XmlFileResolver},
    filter::XmlFilterChain,
    sax::{XmlEntityInput, XmlSAXLocator, XmlScanMode},
    strip::XmlWhitespaceRules,
    valid::XmlValidState,
};
#[cfg(feature = "xinclude")]
use super::xinclude::XmlXIncludeCtxt;

/// What a context reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlContextKind {
    Document,
    /// A general entity, internal or external.
    Entity,
    /// A document included by `xi:include`.
    XInclude,
    ExternalSubset,
    ParameterEntity,
}

impl XmlContextKind {
    /// Check if the top-level elements of this context get xml:base and
    /// xml:lang fixup.
    pub fn needs_fixup(&self) -> bool {
        matches!(self, Self::Entity | Self::XInclude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlContextState {
    /// The scanner of this context produces the current events.
    ActiveTop,
    /// A nested context is being read.
    Suspended,
    Exhausted,
}

/// Which callbacks of a context reach the filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum XmlContextHandler {
    #[default]
    Default,
    /// Declarations only. Comments and processing instructions are dropped.
    DtdSubset,
}

/// Work left when a context is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum XmlExhaustAction {
    #[default]
    None,
    /// Reconcile the declarations and report the end of the DOCTYPE.
    CloseDoctype,
}

/// One entity being parsed.
#[derive(Debug, Clone)]
pub struct XmlParseContext {
    pub kind: XmlContextKind,
    /// The entity name, `%name` for parameter entities.
    pub name: Option<String>,
    /// The URI the bytes were loaded from.
    pub uri: Option<Rc<str>>,
    // the xml:base, xml:lang and xml:space values that apply to the
    // top-level content of this context
    pub content_base: Option<Rc<str>>,
    pub content_lang: Option<Rc<str>>,
    pub content_preserve: Option<bool>,
    // attributes synthesized on the top-level elements
    pub(crate) fixup_base: Option<Rc<str>>,
    pub(crate) fixup_lang: Option<Rc<str>>,
    pub(crate) on_exhaust: XmlExhaustAction,
    pub(crate) handler: XmlContextHandler,
    /// Parameter-entity text referenced from the internal subset.
    pub(crate) in_internal_subset: bool,
    /// The number of open elements when the context was pushed.
    pub(crate) element_depth: usize,
    pub state: XmlContextState,
}

impl XmlParseContext {
    pub(crate) fn new(kind: XmlContextKind, name: Option<&str>, uri: Option<&str>) -> Self {
        Self {
            kind,
            name: name.map(|s| s.to_owned()),
            uri: uri.map(Rc::from),
            content_base: uri.map(Rc::from),
            content_lang: None,
            content_preserve: None,
            fixup_base: None,
            fixup_lang: None,
            on_exhaust: XmlExhaustAction::None,
            handler: XmlContextHandler::Default,
            in_internal_subset: false,
            element_depth: 0,
            state: XmlContextState::ActiveTop,
        }
    }
}

/// A context waiting for its scanner to be created by the driver.
pub(crate) struct XmlPendingContext {
    pub(crate) context: XmlParseContext,
    pub(crate) mode: XmlScanMode,
    pub(crate) input: XmlEntityInput,
    pub(crate) bytes: Vec<u8>,
}

/// An element whose end tag has not been seen yet.
#[derive(Debug, Clone)]
pub(crate) struct XmlOpenElement {
    pub(crate) name: ExpandedName,
    // in-scope xml:base (resolved), xml:lang and xml:space
    pub(crate) base: Option<Rc<str>>,
    pub(crate) lang: Option<Rc<str>>,
    pub(crate) preserve: Option<bool>,
    /// `contexts.len()` when the start tag was read.
    pub(crate) context: usize,
    pub(crate) valid: XmlValidState,
    /// The start tag reached the filters.
    pub(crate) dispatched: bool,
    /// Namespace declarations on this element reached the filters.
    pub(crate) mappings: bool,
}

/// The engine core.
///
/// Receives the events of the scanner on top of the context stack, keeps
/// the character buffer, the DTD and the validation state, and hands the
/// resulting events to the filter chain.
#[doc(alias = "xmlParserCtxt")]
pub struct XmlParserCtxt {
    // the XmlParserOption bits
    pub(crate) options: i32,
    // interned names and text
    pub(crate) dict: XmlDict,
    pub(crate) diag: XmlDiagnostics,
    pub(crate) filters: XmlFilterChain,
    pub(crate) resolver: Box<dyn XmlEntityResolver>,
    pub(crate) encodings: XmlEncodingRegistry,
    pub(crate) strip: XmlWhitespaceRules,
    pub(crate) buffer: XmlCharBuffer,

    // the context stack, innermost last
    pub(crate) contexts: Vec<XmlParseContext>,
    // a context requested by the last event
    pub(crate) pending: Option<XmlPendingContext>,
    // open elements
    pub(crate) nodes: Vec<XmlOpenElement>,
    // namespace declarations of the next start tag
    pub(crate) pending_ns: Vec<(Option<XmlAtom>, XmlAtom)>,
    // the end-of-mapping events of the last closed element are forwarded
    pub(crate) end_mappings: bool,

    pub(crate) dtd: Option<XmlDtd>,
    // elements with an xml:space declaration that is not usable
    pub(crate) space_ignored: HashSet<XmlAtom>,
    // standalone="yes" was declared
    pub(crate) standalone: bool,
    // a parameter entity reference was seen in the DTD
    pub(crate) has_pe_refs: bool,
    pub(crate) no_dtd_reported: bool,

    // suspend after each event
    pub(crate) step_mode: bool,
    pub(crate) suspend_requested: bool,
    // the diagnostic that stopped the parse
    pub(crate) fatal: Option<XmlError>,
    pub(crate) stopped: bool,
    // the location of the event being processed
    pub(crate) locator: XmlSAXLocator,

    #[cfg(feature = "xinclude")]
    pub(crate) xinclude: XmlXIncludeCtxt,
}

impl XmlParserCtxt {
    pub(crate) fn new(options: i32) -> Self {
        let mut diag = XmlDiagnostics::default();
        diag.no_warning = options & XmlParserOption::XmlParseNoWarning as i32 != 0;
        Self {
            options,
            dict: XmlDict::new(),
            diag,
            filters: XmlFilterChain::new(),
            resolver: Box::new(XmlFileResolver),
            encodings: XmlEncodingRegistry::default(),
            strip: XmlWhitespaceRules::new(),
            buffer: XmlCharBuffer::new(),
            contexts: vec![],
            pending: None,
            nodes: vec![],
            pending_ns: vec![],
            end_mappings: false,
            dtd: None,
            space_ignored: HashSet::new(),
            standalone: false,
            has_pe_refs: false,
            no_dtd_reported: false,
            step_mode: false,
            suspend_requested: false,
            fatal: None,
            stopped: false,
            locator: XmlSAXLocator::default(),
            #[cfg(feature = "xinclude")]
            xinclude: XmlXIncludeCtxt::default(),
        }
    }

    /// Forget the state of the previous parse, keeping the configuration.
    pub(crate) fn reset(&mut self) {
        self.diag.reset();
        self.buffer.clear();
        self.contexts.clear();
        self.pending = None;
        self.nodes.clear();
        self.pending_ns.clear();
        self.end_mappings = false;
        self.dtd = None;
        self.space_ignored.clear();
        self.standalone = false;
        self.has_pe_refs = false;
        self.no_dtd_reported = false;
        self.suspend_requested = false;
        self.fatal = None;
        self.stopped = false;
        self.locator = XmlSAXLocator::default();
        #[cfg(feature = "xinclude")]
        {
            self.xinclude = XmlXIncludeCtxt::default();
        }
    }

    pub(crate) fn has_option(&self, option: XmlParserOption) -> bool {
        self.options & option as i32 != 0
    }

    pub(crate) fn validating(&self) -> bool {
        self.has_option(XmlParserOption::XmlParseDTDValid)
    }

    pub fn dict(&self) -> &XmlDict {
        &self.dict
    }

    pub fn diagnostics(&self) -> &XmlDiagnostics {
        &self.diag
    }

    pub fn dtd(&self) -> Option<&XmlDtd> {
        self.dtd.as_ref()
    }

    /// The context stack, innermost last.
    pub fn contexts(&self) -> &[XmlParseContext] {
        &self.contexts
    }

    pub(crate) fn top(&self) -> Option<&XmlParseContext> {
        self.contexts.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut XmlParseContext> {
        self.contexts.last_mut()
    }

    /// Push a context. The previous top is suspended until it is popped.
    #[doc(alias = "inputPush")]
    pub(crate) fn context_push(&mut self, mut context: XmlParseContext) {
        if let Some(top) = self.contexts.last_mut() {
            top.state = XmlContextState::Suspended;
        }
        context.state = XmlContextState::ActiveTop;
        context.element_depth = self.nodes.len();
        log::trace!(
            "push {:?} context {} at depth {}",
            context.kind,
            context.name.as_deref().or(context.uri.as_deref()).unwrap_or("-"),
            self.contexts.len() + 1
        );
        self.contexts.push(context);
    }

    /// Pop the top context and resume its parent.
    #[doc(alias = "inputPop")]
    pub(crate) fn context_pop(&mut self) -> Option<XmlParseContext> {
        let mut context = self.contexts.pop()?;
        context.state = XmlContextState::Exhausted;
        log::trace!(
            "pop {:?} context {}",
            context.kind,
            context.name.as_deref().or(context.uri.as_deref()).unwrap_or("-")
        );
        if let Some(top) = self.contexts.last_mut() {
            top.state = XmlContextState::ActiveTop;
        }
        Some(context)
    }

    /// Check if the entity `name` is already being read.
    pub(crate) fn contains_entity(&self, name: &str) -> bool {
        self.contexts.iter().any(|c| {
            matches!(
                c.kind,
                XmlContextKind::Entity | XmlContextKind::ParameterEntity
            ) && c.name.as_deref() == Some(name)
        })
    }

    /// Check if a document or an inclusion loaded from `uri` is being read.
    pub(crate) fn contains_uri(&self, uri: &str) -> bool {
        self.contexts.iter().any(|c| {
            matches!(c.kind, XmlContextKind::Document | XmlContextKind::XInclude)
                && c.uri.as_deref() == Some(uri)
        })
    }

    /// Check if the events come from a document included by XInclude.
    pub(crate) fn in_included_document(&self) -> bool {
        self.contexts
            .iter()
            .any(|c| c.kind == XmlContextKind::XInclude)
    }

    /// The open element opened within the top context, if any.
    fn scope_node(&self) -> Option<&XmlOpenElement> {
        self.nodes
            .last()
            .filter(|node| node.context == self.contexts.len())
    }

    /// The base URI in scope at the current position.
    pub(crate) fn in_scope_base(&self) -> Option<Rc<str>> {
        match self.scope_node() {
            Some(node) => node.base.clone(),
            None => self.top().and_then(|c| c.content_base.clone()),
        }
    }

    pub(crate) fn in_scope_lang(&self) -> Option<Rc<str>> {
        match self.scope_node() {
            Some(node) => node.lang.clone(),
            None => self.top().and_then(|c| c.content_lang.clone()),
        }
    }

    pub(crate) fn in_scope_preserve(&self) -> Option<bool> {
        match self.scope_node() {
            Some(node) => node.preserve,
            None => self.top().and_then(|c| c.content_preserve),
        }
    }

    /// Prepare a context for the text of an entity or inclusion referenced
    /// at the current position.
    ///
    /// The in-scope values become the baseline of the new context, and for
    /// contexts that get infoset fixup, the attributes to synthesize are
    /// computed against the values of the including context.
    pub(crate) fn new_context(
        &self,
        kind: XmlContextKind,
        name: Option<&str>,
        uri: Option<&str>,
    ) -> XmlParseContext {
        let mut context = XmlParseContext::new(kind, name, uri);
        let in_scope_base = self.in_scope_base();
        let in_scope_lang = self.in_scope_lang();
        context.content_base = match kind {
            XmlContextKind::Entity if uri.is_none() => in_scope_base.clone(),
            _ => uri.map(Rc::from).or_else(|| in_scope_base.clone()),
        };
        context.content_lang = match kind {
            XmlContextKind::XInclude => None,
            _ => in_scope_lang.clone(),
        };
        context.content_preserve = match kind {
            XmlContextKind::XInclude => None,
            _ => self.in_scope_preserve(),
        };
        context.in_internal_subset = self.top().is_some_and(|top| {
            top.in_internal_subset
                || (top.kind == XmlContextKind::Document
                    && top.handler == XmlContextHandler::DtdSubset)
        });

        if kind.needs_fixup() {
            let including = self.top();
            let reference_base = including.and_then(|c| c.content_base.clone());
            if !self.has_option(XmlParserOption::XmlParseNoBaseFix)
                && context.content_base.is_some()
                && context.content_base != reference_base
            {
                context.fixup_base = context.content_base.clone();
            }
            let reference_lang = match kind {
                XmlContextKind::XInclude => in_scope_lang,
                _ => including.and_then(|c| c.content_lang.clone()),
            };
            if context.content_lang != reference_lang {
                context.fixup_lang = Some(context.content_lang.clone().unwrap_or_else(|| Rc::from("")));
            }
        }
        context
    }

    /// Resolve an xml:base value against the base in scope.
    pub(crate) fn resolve_base(&self, value: &str) -> Rc<str> {
        match self.in_scope_base() {
            Some(base) => build_uri(value, &base).map_or_else(|| Rc::from(value), Rc::from),
            None => Rc::from(value),
        }
    }

    /// The attributes to synthesize on a start tag read now, if any.
    pub(crate) fn pending_fixup(&self) -> (Option<Rc<str>>, Option<Rc<str>>) {
        match self.top() {
            Some(top) if top.kind.needs_fixup() && top.element_depth == self.nodes.len() => {
                (top.fixup_base.clone(), top.fixup_lang.clone())
            }
            _ => (None, None),
        }
    }

    /// Queue a context for the driver.
    pub(crate) fn begin_context(
        &mut self,
        context: XmlParseContext,
        mode: XmlScanMode,
        input: XmlEntityInput,
        bytes: Vec<u8>,
    ) {
        self.pending = Some(XmlPendingContext {
            context,
            mode,
            input,
            bytes,
        });
    }
}
