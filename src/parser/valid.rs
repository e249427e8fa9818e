//! Validation against the DTD, as methods of [`XmlParserCtxt`].
//!
//! Declarations are recorded whether or not validation is enabled, since
//! attribute types and whitespace handling depend on them. Diagnostics are
//! only raised with [`XmlParserOption::XmlParseDTDValid`].

use std::rc::Rc;

use crate::{
    automata::{XmlContentModel, XmlSymbol, compile_content_model},
    chvalid::{validate_name, validate_names, validate_nmtoken, validate_nmtokens},
    dict::{ExpandedName, XmlAtom},
    dtd::{
        XmlAttributeDecl, XmlAttributeDefault, XmlAttributeType, XmlDtdState,
        XmlElementContent, XmlElementTypeVal, XmlPendingRef, XmlRefKind,
    },
    error::{XmlError, XmlErrorDomain, XmlErrorLevel, XmlParserErrors},
};

use super::{XmlParserCtxt, XmlParserOption, context::XmlOpenElement, filter::XmlAttribute};

/// The validation state of an open element.
#[derive(Debug, Clone, Default)]
pub(crate) struct XmlValidState {
    pub(crate) etype: XmlElementTypeVal,
    pub(crate) model: Option<Rc<XmlContentModel>>,
    /// The current state in `model`.
    pub(crate) state: usize,
    /// Cleared after the first content-model error, to report it once.
    pub(crate) valid: bool,
}

impl XmlValidState {
    /// Whitespace in this element is insignificant.
    pub(crate) fn is_element_content(&self) -> bool {
        self.etype == XmlElementTypeVal::XmlElementTypeElement
    }

    /// Whitespace in this element is always character data.
    pub(crate) fn is_mixed_content(&self) -> bool {
        self.etype == XmlElementTypeVal::XmlElementTypeMixed
    }
}

/// Check `value` against the lexical space of `atype`.
fn check_attribute_syntax(atype: XmlAttributeType, value: &str) -> bool {
    use XmlAttributeType::*;
    match atype {
        XmlAttributeCDATA => true,
        XmlAttributeID | XmlAttributeIDREF | XmlAttributeEntity | XmlAttributeNotation => {
            validate_name(value).is_ok()
        }
        XmlAttributeIDREFS | XmlAttributeEntities => validate_names(value).is_ok(),
        XmlAttributeNmtoken | XmlAttributeEnumeration => validate_nmtoken(value).is_ok(),
        XmlAttributeNmtokens => validate_nmtokens(value).is_ok(),
    }
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

impl XmlParserCtxt {
    pub(crate) fn valid_error(
        &mut self,
        code: XmlParserErrors,
        msg: String,
        str1: Option<&str>,
        str2: Option<&str>,
        str3: Option<&str>,
    ) {
        if self.validating() {
            self.report(
                XmlErrorDomain::XmlFromValid,
                code,
                XmlErrorLevel::XmlErrError,
                msg,
                [str1, str2, str3],
            );
        }
    }

    pub(crate) fn valid_warning(&mut self, code: XmlParserErrors, msg: String, str1: Option<&str>) {
        if self.validating() {
            self.report(
                XmlErrorDomain::XmlFromValid,
                code,
                XmlErrorLevel::XmlErrWarning,
                msg,
                [str1, None, None],
            );
        }
    }

    /// Record an element declaration and compile its content model.
    ///
    /// The first declaration of an element is binding.
    #[doc(alias = "xmlAddElementDecl")]
    pub(crate) fn add_element_decl(
        &mut self,
        name: &str,
        etype: XmlElementTypeVal,
        content: Option<&XmlElementContent>,
    ) {
        let atom = self.dict.intern(name);
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        let index = dtd.get_or_insert_element(atom);
        if dtd.element_at(index).is_some_and(|elem| elem.is_declared()) {
            self.valid_error(
                XmlParserErrors::XmlDTDElemRedefined,
                format!("Redefinition of element {name}"),
                Some(name),
                None,
                None,
            );
            return;
        }

        if etype == XmlElementTypeVal::XmlElementTypeMixed {
            if let Some(content) = content {
                let mut seen = vec![];
                let mut duplicate = None;
                content.for_each_name(&mut |child| {
                    if seen.iter().any(|s: &String| s == child) {
                        duplicate.get_or_insert_with(|| child.to_owned());
                    } else {
                        seen.push(child.to_owned());
                    }
                });
                if let Some(child) = duplicate {
                    self.valid_error(
                        XmlParserErrors::XmlDTDContentError,
                        format!("Definition of {name} has duplicate references of {child}"),
                        Some(name),
                        Some(&child),
                        None,
                    );
                }
            }
        }

        let model = compile_content_model(etype, content, &mut self.dict);
        if let Some(elem) = self
            .dtd
            .as_mut()
            .and_then(|dtd| dtd.element_at_mut(index))
        {
            elem.etype = etype;
            elem.content = content.cloned();
            elem.cont_model = model;
        }
    }

    /// Record an attribute declaration.
    ///
    /// A second declaration of the same attribute is dropped with a warning.
    #[doc(alias = "xmlAddAttributeDecl")]
    pub(crate) fn add_attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        atype: XmlAttributeType,
        def: XmlAttributeDefault,
        tree: Option<&[String]>,
        default_value: Option<&str>,
    ) {
        let elem_atom = self.dict.intern(element);
        let attr_atom = self.dict.intern(attribute);
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        let index = dtd.get_or_insert_element(elem_atom.clone());
        let Some(elem) = dtd.element_at(index) else {
            return;
        };
        let redefined = elem.attribute(attribute).is_some();
        let other_id = elem.id_attribute().map(|id| id.name.to_string());
        if redefined {
            self.valid_warning(
                XmlParserErrors::XmlDTDAttributeRedefined,
                format!("Attribute {attribute} of element {element}: already defined"),
                Some(element),
            );
            return;
        }

        if let Some(value) = default_value {
            if !check_attribute_syntax(atype, value) {
                self.valid_error(
                    XmlParserErrors::XmlDTDAttributeDefault,
                    format!(
                        "Syntax of default value for attribute {attribute} of {element} is not valid"
                    ),
                    Some(attribute),
                    Some(element),
                    Some(value),
                );
            } else if tree.is_some_and(|tree| !tree.iter().any(|v| v == value)) {
                self.valid_error(
                    XmlParserErrors::XmlDTDAttributeDefault,
                    format!(
                        "Default value \"{value}\" for attribute {attribute} of {element} is not among the enumerated set"
                    ),
                    Some(attribute),
                    Some(element),
                    Some(value),
                );
            }
        }
        if atype == XmlAttributeType::XmlAttributeID {
            if !matches!(
                def,
                XmlAttributeDefault::XmlAttributeImplied | XmlAttributeDefault::XmlAttributeRequired
            ) {
                self.valid_error(
                    XmlParserErrors::XmlDTDIDFixed,
                    format!(
                        "ID attribute {attribute} of {element} is not valid must be #IMPLIED or #REQUIRED"
                    ),
                    Some(attribute),
                    Some(element),
                    None,
                );
            }
            if other_id.is_some() {
                self.valid_error(
                    XmlParserErrors::XmlDTDMultipleID,
                    format!("Element {element} has too many ID attributes defined : {attribute}"),
                    Some(element),
                    Some(attribute),
                    None,
                );
            }
        }
        if attribute == "xml:space" {
            let usable = atype == XmlAttributeType::XmlAttributeEnumeration
                && tree.is_some_and(|tree| {
                    !tree.is_empty() && tree.iter().all(|v| v == "default" || v == "preserve")
                });
            if !usable {
                self.space_ignored.insert(elem_atom.clone());
                self.valid_error(
                    XmlParserErrors::XmlDTDAttributeValue,
                    format!(
                        "xml:space attribute of {element} must be an enumeration of \"default\" and \"preserve\""
                    ),
                    Some(element),
                    Some(attribute),
                    None,
                );
            }
        }

        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        if atype == XmlAttributeType::XmlAttributeNotation {
            for notation in tree.unwrap_or_default() {
                dtd.use_notation(notation, element, attribute);
            }
        }
        if let Some(elem) = dtd.element_at_mut(index) {
            elem.add_attribute(XmlAttributeDecl {
                elem: elem_atom,
                name: attr_atom,
                atype,
                def,
                tree: tree.map(|tree| tree.to_vec()),
                default_value: default_value.map(|v| v.to_owned()),
            });
        }
    }

    /// Reconcile the declarations once both subsets have been read.
    ///
    /// Element types only named by ATTLIST declarations are reported as
    /// warnings, notations that are used and never declared as errors.
    #[doc(alias = "xmlValidateDtdFinal")]
    pub(crate) fn validate_dtd_final(&mut self) {
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        dtd.state = XmlDtdState::SubsetClosed;
        let undeclared = dtd
            .undeclared_elements()
            .map(|elem| elem.name.to_string())
            .collect::<Vec<_>>();
        let mut notations = dtd
            .undeclared_notations()
            .map(|u| (u.notation.clone(), Some(u.element.clone())))
            .collect::<Vec<_>>();
        for entity in dtd.entities() {
            if let Some(notation) = entity.notation.as_deref() {
                if dtd.get_notation(notation).is_none() {
                    notations.push((notation.to_owned(), None));
                }
            }
        }

        for name in undeclared {
            self.valid_warning(
                XmlParserErrors::XmlDTDUnknownElem,
                format!("No declaration for element {name}"),
                Some(&name),
            );
        }
        for (notation, element) in notations {
            self.valid_error(
                XmlParserErrors::XmlDTDUnknownNotation,
                format!("NOTATION {notation} is not declared"),
                Some(&notation),
                element.as_deref(),
                None,
            );
        }
    }

    /// Check the root element against the DOCTYPE name.
    #[doc(alias = "xmlValidateRoot")]
    pub(crate) fn validate_root(&mut self, name: &ExpandedName) {
        let Some(dtd) = self.dtd.as_mut() else {
            if !self.no_dtd_reported {
                self.no_dtd_reported = true;
                self.valid_error(
                    XmlParserErrors::XmlDTDNoDTD,
                    "Validation failed: no DTD found !".to_owned(),
                    None,
                    None,
                    None,
                );
            }
            return;
        };
        let Some(root) = dtd.root_name.take() else {
            return;
        };
        if root != name.qualified_name().as_str() {
            self.valid_error(
                XmlParserErrors::XmlDTDRootName,
                format!("root and DTD name do not match '{name}' and '{root}'"),
                Some(name.qualified_name()),
                Some(&root),
                None,
            );
        }
    }

    /// Step the content model of the parent with `symbol`.
    fn validate_parent_step(&mut self, symbol: XmlSymbol, got: &str) {
        let Some(parent) = self.nodes.last_mut() else {
            return;
        };
        if !parent.valid.valid {
            return;
        }
        if parent.valid.etype == XmlElementTypeVal::XmlElementTypeEmpty {
            let name = parent.name.qualified_name().clone();
            parent.valid.valid = false;
            self.valid_error(
                XmlParserErrors::XmlDTDNotEmpty,
                format!("Element {name} was declared EMPTY this one has content"),
                Some(&name),
                None,
                None,
            );
            return;
        }
        let Some(model) = parent.valid.model.clone() else {
            return;
        };
        match model.step(parent.valid.state, &symbol) {
            Some(next) => parent.valid.state = next,
            None => {
                parent.valid.valid = false;
                let name = parent.name.qualified_name().clone();
                let expected = model.expected(parent.valid.state);
                self.valid_error(
                    XmlParserErrors::XmlDTDContentModel,
                    format!(
                        "Element {name} content does not follow the DTD, expecting {expected}, got {got}"
                    ),
                    Some(&name),
                    Some(&expected),
                    Some(got),
                );
            }
        }
    }

    fn validate_attribute_value(&mut self, element: &str, decl: &XmlAttributeDecl, value: &str) {
        let attribute = decl.name.as_str();
        if !check_attribute_syntax(decl.atype, value) {
            self.valid_error(
                XmlParserErrors::XmlDTDAttributeValue,
                format!("Syntax of value for attribute {attribute} of {element} is not valid"),
                Some(attribute),
                Some(element),
                Some(value),
            );
            return;
        }
        match decl.atype {
            XmlAttributeType::XmlAttributeEnumeration if !decl.allows(value) => {
                self.valid_error(
                    XmlParserErrors::XmlDTDAttributeValue,
                    format!(
                        "Value \"{value}\" for attribute {attribute} of {element} is not among the enumerated set"
                    ),
                    Some(attribute),
                    Some(element),
                    Some(value),
                );
            }
            XmlAttributeType::XmlAttributeNotation if !decl.allows(value) => {
                self.valid_error(
                    XmlParserErrors::XmlDTDNotationValue,
                    format!(
                        "Value \"{value}\" for attribute {attribute} of {element} is not among the enumerated notations"
                    ),
                    Some(attribute),
                    Some(element),
                    Some(value),
                );
            }
            XmlAttributeType::XmlAttributeID => {
                let added = self.dtd.as_mut().is_some_and(|dtd| dtd.add_id(value));
                if !added {
                    self.valid_error(
                        XmlParserErrors::XmlDTDIDRedefined,
                        format!("ID {value} already defined"),
                        Some(value),
                        Some(attribute),
                        Some(element),
                    );
                }
            }
            XmlAttributeType::XmlAttributeIDREF
            | XmlAttributeType::XmlAttributeIDREFS
            | XmlAttributeType::XmlAttributeEntity
            | XmlAttributeType::XmlAttributeEntities => {
                let kind = match decl.atype {
                    XmlAttributeType::XmlAttributeIDREF | XmlAttributeType::XmlAttributeIDREFS => {
                        XmlRefKind::Id
                    }
                    _ => XmlRefKind::Entity,
                };
                let file = self.locator.system_id.as_deref().map(|s| s.to_owned());
                let (line, col) = (self.locator.line, self.locator.col);
                if let Some(dtd) = self.dtd.as_mut() {
                    for token in value.split_ascii_whitespace() {
                        dtd.queue_ref(XmlPendingRef {
                            kind,
                            value: token.to_owned(),
                            element: element.to_owned(),
                            attribute: attribute.to_owned(),
                            file: file.clone(),
                            line,
                            col,
                        });
                    }
                }
            }
            _ => {}
        }
        if decl.def == XmlAttributeDefault::XmlAttributeFixed {
            if let Some(default) = decl.default_value.as_deref() {
                if default != value {
                    self.valid_error(
                        XmlParserErrors::XmlDTDAttributeDefault,
                        format!(
                            "Value for attribute {attribute} of {element} is different from default \"{default}\""
                        ),
                        Some(attribute),
                        Some(element),
                        Some(default),
                    );
                }
            }
        }
    }

    /// Check a start tag and build the validation state of the new element.
    ///
    /// Must be called before the element is pushed on the open-element
    /// stack, since the parent content model is stepped here.
    #[doc(alias = "xmlValidatePushElement")]
    pub(crate) fn validate_push_element(
        &mut self,
        name: &ExpandedName,
        attributes: &[XmlAttribute],
    ) -> XmlValidState {
        let qname = name.qualified_name().clone();
        let decl = self
            .dtd
            .as_ref()
            .and_then(|dtd| dtd.element(&qname))
            .cloned();
        let state = XmlValidState {
            etype: decl.as_ref().map_or(XmlElementTypeVal::XmlElementTypeUndefined, |d| {
                d.etype
            }),
            model: decl.as_ref().and_then(|d| d.content_model().cloned()),
            state: 0,
            valid: true,
        };
        if !self.validating() {
            return state;
        }
        if self.nodes.is_empty() {
            self.validate_root(name);
        }
        if self.dtd.is_none() {
            return state;
        }
        self.validate_parent_step(XmlSymbol::Name(qname.clone()), &qname);

        let Some(decl) = decl.filter(|d| d.is_declared()) else {
            self.valid_error(
                XmlParserErrors::XmlDTDUnknownElem,
                format!("No declaration for element {qname}"),
                Some(&qname),
                None,
                None,
            );
            return state;
        };

        for attr in attributes {
            let attr_name = attr.name.qualified_name();
            match decl.attribute(attr_name) {
                Some(attr_decl) => {
                    self.validate_attribute_value(&qname, attr_decl, &attr.value);
                }
                None => {
                    self.valid_error(
                        XmlParserErrors::XmlDTDUnknownAttribute,
                        format!("No declaration for attribute {attr_name} of element {qname}"),
                        Some(attr_name),
                        Some(&qname),
                        None,
                    );
                }
            }
        }
        for attr_decl in decl.attributes() {
            if attr_decl.def != XmlAttributeDefault::XmlAttributeRequired
                || is_namespace_declaration(&attr_decl.name)
            {
                continue;
            }
            if !attributes
                .iter()
                .any(|a| a.name.qualified_name() == &attr_decl.name)
            {
                self.valid_error(
                    XmlParserErrors::XmlDTDMissingAttribute,
                    format!(
                        "Element {qname} does not carry attribute {}",
                        attr_decl.name
                    ),
                    Some(&qname),
                    Some(&attr_decl.name),
                    None,
                );
            }
        }
        state
    }

    /// Check a run of character data against the innermost open element.
    #[doc(alias = "xmlValidatePushCData")]
    pub(crate) fn validate_push_cdata(&mut self, whitespace_only: bool) {
        if !self.validating() || self.dtd.is_none() {
            return;
        }
        let Some(etype) = self.nodes.last().map(|parent| parent.valid.etype) else {
            return;
        };
        match etype {
            XmlElementTypeVal::XmlElementTypeEmpty => {
                self.validate_parent_step(XmlSymbol::PCData, "#PCDATA");
            }
            _ if whitespace_only => {}
            _ => self.validate_parent_step(XmlSymbol::PCData, "#PCDATA"),
        }
    }

    /// Check that the content of a closed element is complete.
    #[doc(alias = "xmlValidatePopElement")]
    pub(crate) fn validate_pop_element(&mut self, node: &XmlOpenElement) {
        if !self.validating() || !node.valid.valid {
            return;
        }
        let Some(model) = node.valid.model.as_ref() else {
            return;
        };
        if !model.can_end(node.valid.state) {
            let name = node.name.qualified_name();
            let expected = model.expected(node.valid.state);
            self.valid_error(
                XmlParserErrors::XmlDTDContentModel,
                format!(
                    "Element {name} content does not follow the DTD, expecting {expected}, got end of content"
                ),
                Some(name),
                Some(&expected),
                None,
            );
        }
    }

    /// Check the IDREF and ENTITY values queued while reading the document.
    #[doc(alias = "xmlValidateDocumentFinal")]
    pub(crate) fn validate_document_final(&mut self) {
        let Some(dtd) = self.dtd.as_mut() else {
            return;
        };
        let refs = dtd.take_refs();
        dtd.state = XmlDtdState::Validated;
        if !self.validating() {
            return;
        }
        for pending in refs {
            let failure = {
                let Some(dtd) = self.dtd.as_ref() else {
                    return;
                };
                match pending.kind {
                    XmlRefKind::Id if !dtd.has_id(&pending.value) => Some((
                        XmlParserErrors::XmlDTDUnknownID,
                        format!(
                            "IDREF attribute {} references an unknown ID \"{}\"",
                            pending.attribute, pending.value
                        ),
                    )),
                    XmlRefKind::Entity
                        if !dtd
                            .get_entity(&pending.value)
                            .is_some_and(|entity| entity.is_unparsed()) =>
                    {
                        Some((
                            XmlParserErrors::XmlDTDUnknownEntity,
                            format!(
                                "ENTITY attribute {} reference an unknown entity \"{}\"",
                                pending.attribute, pending.value
                            ),
                        ))
                    }
                    _ => None,
                }
            };
            if let Some((code, msg)) = failure {
                let error = XmlError::new(
                    XmlErrorDomain::XmlFromValid,
                    code,
                    XmlErrorLevel::XmlErrError,
                    msg,
                )
                .with_params(
                    Some(&pending.attribute),
                    Some(&pending.element),
                    Some(&pending.value),
                )
                .with_location(pending.file.as_deref(), pending.line, pending.col);
                self.report_error(error);
            }
        }
    }

    /// Check if the xml:space declaration of `name` cannot be honored.
    pub(crate) fn space_declaration_ignored(&self, name: &XmlAtom) -> bool {
        self.space_ignored.contains(name)
    }
}
