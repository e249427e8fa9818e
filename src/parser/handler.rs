//! The engine core as a receiver of scanner events.
//!
//! Every event of the scanner on top of the context stack goes through
//! [`XmlParserCtxt::process_event`]. Character data is collected in the
//! text buffer and flushed before the next structural event, entity
//! references open new contexts, declarations are recorded in the DTD and
//! checked, and what remains is handed to the filter chain as
//! [`XmlEvent`]s.

use std::rc::Rc;

use crate::{
    XML_XML_NAMESPACE,
    dict::{ExpandedName, XML_BASE_RAW, XML_LANG_RAW},
    dtd::{XmlDtd, XmlElementTypeVal, XmlEntity, XmlEntityType, XmlNotation},
    encoding::XmlCharEncodingHandler,
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
};

use super::{
    XmlParserCtxt, XmlParserOption,
    buffer::XmlTextKind,
    context::{XmlContextHandler, XmlContextKind, XmlExhaustAction, XmlOpenElement},
    filter::{XmlAttribute, XmlEvent},
    sax::{
        XmlEntityInput, XmlSAXLocator, XmlScanAttribute, XmlScanControl, XmlScanEvent,
        XmlScanHandler, XmlScanMode,
    },
    valid::XmlValidState,
};
#[cfg(feature = "xinclude")]
use super::xinclude::XmlIncludeAction;

impl XmlParserCtxt {
    /// Build a diagnostic at the current position and route it.
    pub(crate) fn report(
        &mut self,
        domain: XmlErrorDomain,
        code: XmlParserErrors,
        level: XmlErrorLevel,
        msg: String,
        params: [Option<&str>; 3],
    ) {
        let error = XmlError::new(domain, code, level, msg)
            .with_params(params[0], params[1], params[2])
            .with_location(
                self.locator.system_id.as_deref(),
                self.locator.line,
                self.locator.col,
            );
        self.report_error(error);
    }

    /// Route a diagnostic. One that stops the parse is kept in `fatal`.
    pub(crate) fn report_error(&mut self, error: XmlError) {
        if let Err(error) = self.diag.report(error) {
            if self.fatal.is_none() {
                self.fatal = Some(error);
            }
        }
    }

    #[doc(alias = "xmlFatalErrMsgStr")]
    fn fatal_err(&mut self, code: XmlParserErrors, msg: String, str1: Option<&str>) {
        self.report(
            XmlErrorDomain::XmlFromParser,
            code,
            XmlErrorLevel::XmlErrFatal,
            msg,
            [str1, None, None],
        );
    }

    #[doc(alias = "xmlWarningMsg")]
    fn warning_msg(&mut self, code: XmlParserErrors, msg: String, str1: Option<&str>) {
        self.report(
            XmlErrorDomain::XmlFromParser,
            code,
            XmlErrorLevel::XmlErrWarning,
            msg,
            [str1, None, None],
        );
    }

    /// A resource that could not be loaded. Only an error when validating,
    /// since the content is otherwise not needed to go on.
    fn load_failure(&mut self, system_id: &str, err: &anyhow::Error, required: bool) {
        let level = if required || self.validating() {
            XmlErrorLevel::XmlErrError
        } else {
            XmlErrorLevel::XmlErrWarning
        };
        self.report(
            XmlErrorDomain::XmlFromIO,
            XmlParserErrors::XmlIOLoadError,
            level,
            format!("failed to load external entity \"{system_id}\": {err:#}"),
            [Some(system_id), None, None],
        );
    }

    /// Hand an event to the filter chain.
    pub(crate) fn dispatch(&mut self, event: XmlEvent) {
        if !self.stopped {
            self.filters.dispatch(&event);
        }
    }

    fn skipping(&self) -> bool {
        #[cfg(feature = "xinclude")]
        {
            self.xinclude_skipping()
        }
        #[cfg(not(feature = "xinclude"))]
        {
            false
        }
    }

    fn in_dtd_subset(&self) -> bool {
        self.top()
            .is_some_and(|top| top.handler == XmlContextHandler::DtdSubset)
    }

    /// Decide whether whitespace-only text in the current element is kept.
    ///
    /// ```text
    /// xml:space="preserve" in scope
    ///   > declared mixed content
    ///   > the most specific strip/preserve rule
    ///   > ignorable in element content when validating
    ///   > preserved
    /// ```
    fn whitespace_preserved(&self) -> bool {
        if self.in_scope_preserve() == Some(true) {
            return true;
        }
        let Some(node) = self.nodes.last() else {
            return true;
        };
        if node.valid.is_mixed_content() {
            return true;
        }
        if let Some(preserve) = self.strip.lookup(&node.name) {
            return preserve;
        }
        !(self.validating() && node.valid.is_element_content())
    }

    /// Report the buffered character data.
    #[doc(alias = "xmlSAX2Characters")]
    pub(crate) fn flush_text(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let preserve = self.whitespace_preserved();
        let Some(run) = self.buffer.flush(preserve) else {
            return;
        };
        self.validate_push_cdata(run.whitespace_only && !run.cdata);
        let text = if run.whitespace_only {
            self.dict.intern_text(&run.text)
        } else {
            Rc::from(run.text)
        };
        match run.kind {
            XmlTextKind::Characters => self.dispatch(XmlEvent::Characters(text)),
            XmlTextKind::IgnorableWhitespace => {
                self.dispatch(XmlEvent::IgnorableWhitespace(text))
            }
        }
    }

    /// Called by the driver when the scanner of the top context finished.
    pub(crate) fn end_context(&mut self) {
        let Some(context) = self.context_pop() else {
            return;
        };
        match context.on_exhaust {
            XmlExhaustAction::None => {}
            XmlExhaustAction::CloseDoctype => self.close_doctype(),
        }
    }

    fn close_doctype(&mut self) {
        if let Some(top) = self.top_mut() {
            top.handler = XmlContextHandler::Default;
        }
        self.validate_dtd_final();
        self.dispatch(XmlEvent::EndDoctype);
    }

    /// Turn the attributes of a start tag into their final form.
    fn build_attributes(
        &mut self,
        element: &ExpandedName,
        attributes: &[XmlScanAttribute],
    ) -> Result<Vec<XmlAttribute>, XmlError> {
        let mut result = Vec::with_capacity(attributes.len() + 2);
        for attr in attributes {
            let name = self.dict.split(&attr.name)?;
            let atype = self
                .dtd
                .as_ref()
                .and_then(|dtd| dtd.element(element.qualified_name()))
                .and_then(|decl| decl.attribute(name.qualified_name()))
                .map(|decl| decl.atype);
            result.push(XmlAttribute {
                name,
                value: Rc::from(attr.value.as_str()),
                atype,
                specified: attr.specified,
            });
        }
        Ok(result)
    }

    /// The xml:space value of a start tag, if it can be honored.
    fn space_attribute(&mut self, name: &ExpandedName, attributes: &[XmlAttribute]) -> Option<bool> {
        let attr = attributes
            .iter()
            .find(|attr| attr.name.is(Some(XML_XML_NAMESPACE), "space"))?;
        if self.space_declaration_ignored(name.qualified_name()) {
            return None;
        }
        match &*attr.value {
            "preserve" => Some(true),
            "default" => Some(false),
            value => {
                let value = value.to_owned();
                self.warning_msg(
                    XmlParserErrors::XmlWarSpaceValue,
                    format!("Invalid value \"{value}\" for xml:space : \"default\" or \"preserve\" expected"),
                    Some(&value),
                );
                None
            }
        }
    }

    #[doc(alias = "xmlSAX2StartElementNs")]
    fn start_element(&mut self, raw: &str, attributes: &[XmlScanAttribute]) {
        let name = match self.dict.split(raw) {
            Ok(name) => name,
            Err(error) => return self.report_error(error),
        };
        #[cfg(feature = "xinclude")]
        let action = self.xinclude_start_element(&name);
        #[cfg(feature = "xinclude")]
        if action == XmlIncludeAction::Hide {
            self.pending_ns.clear();
            let node = XmlOpenElement {
                name,
                base: self.in_scope_base(),
                lang: self.in_scope_lang(),
                preserve: self.in_scope_preserve(),
                context: self.contexts.len(),
                valid: XmlValidState::default(),
                dispatched: false,
                mappings: false,
            };
            self.nodes.push(node);
            return;
        }

        let mut attrs = match self.build_attributes(&name, attributes) {
            Ok(attrs) => attrs,
            Err(error) => return self.report_error(error),
        };
        let explicit_base = attrs
            .iter()
            .find(|attr| attr.name.is(Some(XML_XML_NAMESPACE), "base"))
            .map(|attr| attr.value.clone());
        let explicit_lang = attrs
            .iter()
            .find(|attr| attr.name.is(Some(XML_XML_NAMESPACE), "lang"))
            .map(|attr| attr.value.clone());
        let base = match &explicit_base {
            Some(value) => Some(self.resolve_base(value)),
            None => self.in_scope_base(),
        };
        let lang = explicit_lang.clone().or_else(|| self.in_scope_lang());
        let preserve = self
            .space_attribute(&name, &attrs)
            .or_else(|| self.in_scope_preserve());

        let valid = self.validate_push_element(&name, &attrs);

        let (fixup_base, fixup_lang) = self.pending_fixup();
        if let (Some(value), None) = (fixup_base, &explicit_base) {
            match self.dict.split(XML_BASE_RAW) {
                Ok(name) => attrs.push(XmlAttribute {
                    name,
                    value,
                    atype: None,
                    specified: false,
                }),
                Err(error) => return self.report_error(error),
            }
        }
        if let (Some(value), None) = (fixup_lang, &explicit_lang) {
            match self.dict.split(XML_LANG_RAW) {
                Ok(name) => attrs.push(XmlAttribute {
                    name,
                    value,
                    atype: None,
                    specified: false,
                }),
                Err(error) => return self.report_error(error),
            }
        }

        #[cfg(feature = "xinclude")]
        let dispatched = action == XmlIncludeAction::Dispatch;
        #[cfg(not(feature = "xinclude"))]
        let dispatched = true;

        let mappings = std::mem::take(&mut self.pending_ns);
        let node = XmlOpenElement {
            name: name.clone(),
            base,
            lang,
            preserve,
            context: self.contexts.len(),
            valid,
            dispatched,
            mappings: dispatched && !mappings.is_empty(),
        };
        self.nodes.push(node);
        let attributes: Rc<[XmlAttribute]> = attrs.into();
        if dispatched {
            for (prefix, uri) in mappings {
                self.dispatch(XmlEvent::StartPrefixMapping { prefix, uri });
            }
            self.dispatch(XmlEvent::StartElement {
                name,
                attributes: attributes.clone(),
            });
        }
        #[cfg(feature = "xinclude")]
        if action == XmlIncludeAction::Include {
            self.xinclude_include(&attributes);
        }
    }

    #[doc(alias = "xmlSAX2EndElementNs")]
    fn end_element(&mut self) {
        let Some(node) = self.nodes.pop() else {
            return;
        };
        self.validate_pop_element(&node);
        self.end_mappings = node.mappings;
        if node.dispatched {
            self.dispatch(XmlEvent::EndElement { name: node.name });
        }
        #[cfg(feature = "xinclude")]
        self.xinclude_end_element(self.nodes.len() + 1);
    }

    fn start_doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        has_internal_subset: bool,
    ) {
        self.dtd = Some(XmlDtd::new(Some(name), public_id, system_id));
        if has_internal_subset {
            if let Some(top) = self.top_mut() {
                top.handler = XmlContextHandler::DtdSubset;
            }
        }
        self.dispatch(XmlEvent::StartDoctype {
            name: name.to_owned(),
            public_id: public_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
        });
    }

    /// The internal subset is complete. Read the external subset, if any,
    /// before the DOCTYPE is closed.
    #[doc(alias = "xmlSAX2ExternalSubset")]
    fn end_internal_subset(&mut self) {
        if let Some(top) = self.top_mut() {
            top.handler = XmlContextHandler::Default;
        }
        let (public_id, system_id) = match self.dtd.as_ref() {
            Some(dtd) => (dtd.external_id.clone(), dtd.system_id.clone()),
            None => (None, None),
        };
        let Some(system_id) = system_id else {
            return self.close_doctype();
        };
        if self.has_option(XmlParserOption::XmlParseNoExtPE) {
            return self.close_doctype();
        }
        let base = self.top().and_then(|top| top.uri.clone());
        match self
            .resolver
            .resolve(public_id.as_deref(), &system_id, base.as_deref())
        {
            Ok(source) => {
                let mut context =
                    self.new_context(XmlContextKind::ExternalSubset, None, Some(&source.uri));
                context.on_exhaust = XmlExhaustAction::CloseDoctype;
                context.handler = XmlContextHandler::DtdSubset;
                let input = XmlEntityInput {
                    system_id: Some(source.uri),
                    ..Default::default()
                };
                self.begin_context(context, XmlScanMode::Dtd, input, source.bytes);
            }
            Err(err) => {
                self.load_failure(&system_id, &err, false);
                self.close_doctype();
            }
        }
    }

    fn entity_decl(
        &mut self,
        name: &str,
        etype: XmlEntityType,
        value: Option<&str>,
        public_id: Option<&str>,
        system_id: Option<&str>,
        notation: Option<&str>,
    ) {
        let base = self.in_scope_base().map(|base| base.to_string());
        let entity = XmlEntity {
            name: name.to_owned(),
            etype,
            content: value.map(|s| s.to_owned()),
            external_id: public_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
            base,
            notation: notation.map(|s| s.to_owned()),
        };
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        if !dtd.add_entity(entity) {
            log::debug!("entity {name} redefined, keeping the first declaration");
            return;
        }
        let event = match etype {
            XmlEntityType::XmlInternalGeneralEntity => XmlEvent::InternalEntityDecl {
                name: name.to_owned(),
                value: value.unwrap_or_default().to_owned(),
            },
            XmlEntityType::XmlExternalGeneralParsedEntity => XmlEvent::ExternalEntityDecl {
                name: name.to_owned(),
                public_id: public_id.map(|s| s.to_owned()),
                system_id: system_id.map(|s| s.to_owned()),
            },
            XmlEntityType::XmlExternalGeneralUnparsedEntity => XmlEvent::UnparsedEntityDecl {
                name: name.to_owned(),
                public_id: public_id.map(|s| s.to_owned()),
                system_id: system_id.map(|s| s.to_owned()),
                notation: notation.unwrap_or_default().to_owned(),
            },
            _ => return,
        };
        self.dispatch(event);
    }

    fn notation_decl(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>) {
        let notation = XmlNotation {
            name: name.to_owned(),
            public_id: public_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
        };
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        if !dtd.add_notation(notation) {
            self.valid_warning(
                XmlParserErrors::XmlDTDNotationRedefined,
                format!("xmlAddNotationDecl: {name} already defined"),
                Some(name),
            );
            return;
        }
        self.dispatch(XmlEvent::NotationDecl {
            name: name.to_owned(),
            public_id: public_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
        });
    }

    /// Undeclared entities only break well-formedness in a document that
    /// cannot have declarations the parser did not read.
    fn undeclared_entity_is_fatal(&self) -> bool {
        let external = self.dtd.as_ref().is_some_and(|dtd| dtd.system_id.is_some());
        self.standalone || !(external || self.has_pe_refs)
    }

    /// A general entity reference in content.
    #[doc(alias = "xmlParseReference")]
    fn entity_reference(&mut self, name: &str) {
        let entity = self
            .dtd
            .as_ref()
            .and_then(|dtd| dtd.get_entity(name))
            .cloned();
        let Some(entity) = entity else {
            if self.undeclared_entity_is_fatal() {
                self.fatal_err(
                    XmlParserErrors::XmlErrUndeclaredEntity,
                    format!("Entity '{name}' not defined"),
                    Some(name),
                );
            } else {
                self.warning_msg(
                    XmlParserErrors::XmlWarUndeclaredEntity,
                    format!("Entity '{name}' not defined"),
                    Some(name),
                );
                self.valid_error(
                    XmlParserErrors::XmlErrUndeclaredEntity,
                    format!("Entity '{name}' not defined"),
                    Some(name),
                    None,
                    None,
                );
                self.dispatch(XmlEvent::SkippedEntity(name.to_owned()));
            }
            return;
        };
        if entity.is_unparsed() {
            return self.fatal_err(
                XmlParserErrors::XmlErrUnparsedEntity,
                format!("Entity reference to unparsed entity {name}"),
                Some(name),
            );
        }
        if self.contains_entity(name) {
            return self.fatal_err(
                XmlParserErrors::XmlErrEntityLoop,
                format!("Detected an entity reference loop on {name}"),
                Some(name),
            );
        }
        match entity.etype {
            XmlEntityType::XmlExternalGeneralParsedEntity => {
                let Some(system_id) = entity.system_id.as_deref() else {
                    return;
                };
                let base = entity
                    .base
                    .as_deref()
                    .map(Rc::from)
                    .or_else(|| self.in_scope_base());
                match self.resolver.resolve(
                    entity.external_id.as_deref(),
                    system_id,
                    base.as_deref(),
                ) {
                    Ok(source) => {
                        let context =
                            self.new_context(XmlContextKind::Entity, Some(name), Some(&source.uri));
                        let input = XmlEntityInput {
                            system_id: Some(source.uri),
                            ..Default::default()
                        };
                        self.begin_context(context, XmlScanMode::Content, input, source.bytes);
                    }
                    Err(err) => {
                        self.load_failure(system_id, &err, true);
                        self.dispatch(XmlEvent::SkippedEntity(name.to_owned()));
                    }
                }
            }
            _ => {
                let context = self.new_context(XmlContextKind::Entity, Some(name), None);
                let input = XmlEntityInput {
                    system_id: self.locator.system_id.as_deref().map(|s| s.to_owned()),
                    internal: true,
                    in_internal_subset: false,
                };
                let bytes = entity.content.unwrap_or_default().into_bytes();
                self.begin_context(context, XmlScanMode::Content, input, bytes);
            }
        }
    }

    /// A parameter entity reference between declarations.
    #[doc(alias = "xmlParsePEReference")]
    fn pe_reference(&mut self, name: &str) {
        self.has_pe_refs = true;
        let key = format!("%{name}");
        let entity = self
            .dtd
            .as_ref()
            .and_then(|dtd| dtd.get_parameter_entity(name))
            .cloned();
        let Some(entity) = entity else {
            self.warning_msg(
                XmlParserErrors::XmlWarUndeclaredEntity,
                format!("PEReference: %{name}; not found"),
                Some(name),
            );
            self.dispatch(XmlEvent::SkippedEntity(key));
            return;
        };
        if self.contains_entity(&key) {
            return self.fatal_err(
                XmlParserErrors::XmlErrEntityLoop,
                format!("Detected an entity reference loop on %{name}"),
                Some(name),
            );
        }
        if entity.etype == XmlEntityType::XmlExternalParameterEntity {
            let Some(system_id) = entity.system_id.as_deref() else {
                return;
            };
            if self.has_option(XmlParserOption::XmlParseNoExtPE) {
                self.dispatch(XmlEvent::SkippedEntity(key));
                return;
            }
            let base = entity
                .base
                .as_deref()
                .map(Rc::from)
                .or_else(|| self.in_scope_base());
            match self
                .resolver
                .resolve(entity.external_id.as_deref(), system_id, base.as_deref())
            {
                Ok(source) => {
                    let mut context = self.new_context(
                        XmlContextKind::ParameterEntity,
                        Some(&key),
                        Some(&source.uri),
                    );
                    context.handler = XmlContextHandler::DtdSubset;
                    let input = XmlEntityInput {
                        system_id: Some(source.uri),
                        internal: false,
                        in_internal_subset: false,
                    };
                    self.begin_context(context, XmlScanMode::Dtd, input, source.bytes);
                }
                Err(err) => {
                    self.load_failure(system_id, &err, false);
                    self.dispatch(XmlEvent::SkippedEntity(key));
                }
            }
            return;
        }
        let mut context = self.new_context(XmlContextKind::ParameterEntity, Some(&key), None);
        context.handler = XmlContextHandler::DtdSubset;
        let input = XmlEntityInput {
            system_id: self.locator.system_id.as_deref().map(|s| s.to_owned()),
            internal: true,
            in_internal_subset: context.in_internal_subset,
        };
        let bytes = entity.content.unwrap_or_default().into_bytes();
        self.begin_context(context, XmlScanMode::Dtd, input, bytes);
    }

    fn handle_event(&mut self, event: &XmlScanEvent) {
        let included = self.in_included_document();
        match event {
            XmlScanEvent::StartDocument => {
                if !included {
                    self.dispatch(XmlEvent::StartDocument);
                }
            }
            XmlScanEvent::EndDocument => {
                if !included {
                    self.validate_document_final();
                    self.dispatch(XmlEvent::EndDocument);
                }
            }
            XmlScanEvent::XmlDecl { standalone, .. } => {
                if self.contexts.len() == 1 {
                    self.standalone = *standalone == Some(true);
                }
            }
            XmlScanEvent::StartElement { name, attributes } => {
                self.start_element(name, attributes)
            }
            XmlScanEvent::EndElement { .. } => self.end_element(),
            XmlScanEvent::Characters(text) => {
                if !self.skipping() && !self.in_dtd_subset() {
                    self.buffer.write(text);
                }
            }
            XmlScanEvent::StartCData => {
                if !self.skipping() {
                    self.buffer.set_cdata(true);
                    self.dispatch(XmlEvent::StartCData);
                }
            }
            XmlScanEvent::EndCData => {
                if !self.skipping() {
                    self.buffer.set_cdata(false);
                    self.dispatch(XmlEvent::EndCData);
                }
            }
            XmlScanEvent::ProcessingInstruction { target, data } => {
                if !self.skipping() && !self.in_dtd_subset() {
                    self.dispatch(XmlEvent::ProcessingInstruction {
                        target: target.clone(),
                        data: data.clone(),
                    });
                }
            }
            XmlScanEvent::Comment(text) => {
                if !self.skipping() && !self.in_dtd_subset() {
                    self.dispatch(XmlEvent::Comment(text.clone()));
                }
            }
            XmlScanEvent::StartNamespaceDecl { prefix, uri } => {
                let prefix = prefix.as_deref().map(|prefix| self.dict.intern(prefix));
                let uri = self.dict.intern(uri);
                self.pending_ns.push((prefix, uri));
            }
            XmlScanEvent::EndNamespaceDecl { prefix } => {
                if self.end_mappings {
                    let prefix = prefix.as_deref().map(|prefix| self.dict.intern(prefix));
                    self.dispatch(XmlEvent::EndPrefixMapping { prefix });
                }
            }
            XmlScanEvent::StartDoctypeDecl {
                name,
                public_id,
                system_id,
                has_internal_subset,
            } => {
                if !included {
                    self.start_doctype(
                        name,
                        public_id.as_deref(),
                        system_id.as_deref(),
                        *has_internal_subset,
                    );
                }
            }
            XmlScanEvent::EndDoctypeDecl => {
                if !included {
                    self.end_internal_subset();
                }
            }
            XmlScanEvent::ElementDecl {
                name,
                etype,
                content,
            } => {
                if included {
                    return;
                }
                self.add_element_decl(name, *etype, content.as_ref());
                let model = match etype {
                    XmlElementTypeVal::XmlElementTypeEmpty => "EMPTY".to_owned(),
                    XmlElementTypeVal::XmlElementTypeAny => "ANY".to_owned(),
                    _ => content.as_ref().map(|c| c.to_string()).unwrap_or_default(),
                };
                self.dispatch(XmlEvent::ElementDecl {
                    name: name.clone(),
                    model,
                });
            }
            XmlScanEvent::AttlistDecl {
                element,
                attribute,
                atype,
                def,
                tree,
                default_value,
            } => {
                if included {
                    return;
                }
                self.add_attribute_decl(
                    element,
                    attribute,
                    *atype,
                    *def,
                    tree.as_deref(),
                    default_value.as_deref(),
                );
                self.dispatch(XmlEvent::AttributeDecl {
                    element: element.clone(),
                    attribute: attribute.clone(),
                    atype: *atype,
                    def: *def,
                    tree: tree.clone(),
                    default_value: default_value.clone(),
                });
            }
            XmlScanEvent::EntityDecl {
                name,
                etype,
                value,
                public_id,
                system_id,
                notation,
            } => {
                if !included {
                    self.entity_decl(
                        name,
                        *etype,
                        value.as_deref(),
                        public_id.as_deref(),
                        system_id.as_deref(),
                        notation.as_deref(),
                    );
                }
            }
            XmlScanEvent::NotationDecl {
                name,
                public_id,
                system_id,
            } => {
                if !included {
                    self.notation_decl(name, public_id.as_deref(), system_id.as_deref());
                }
            }
            XmlScanEvent::EntityReference { name, is_parameter } => {
                if self.skipping() {
                    return;
                }
                if *is_parameter {
                    if !included {
                        self.pe_reference(name);
                    }
                } else {
                    self.entity_reference(name);
                }
            }
        }
    }
}

impl XmlScanHandler for XmlParserCtxt {
    fn process_event(&mut self, event: &XmlScanEvent, loc: &XmlSAXLocator) -> XmlScanControl {
        if self.stopped {
            return XmlScanControl::Stop;
        }
        self.locator = loc.clone();
        if event.is_structural() {
            self.flush_text();
        }
        self.handle_event(event);

        if self.fatal.is_some() || self.stopped {
            return XmlScanControl::Stop;
        }
        if self.pending.is_some() {
            return XmlScanControl::Suspend;
        }
        if self.step_mode {
            self.suspend_requested = true;
            return XmlScanControl::Suspend;
        }
        XmlScanControl::Continue
    }

    fn unknown_encoding(&mut self, name: &str) -> Option<XmlCharEncodingHandler> {
        self.encodings.find(name)
    }

    fn warning(&mut self, error: XmlError) -> XmlScanControl {
        self.report_error(error);
        if self.fatal.is_some() {
            XmlScanControl::Stop
        } else {
            XmlScanControl::Continue
        }
    }
}
