use std::rc::Rc;

use crate::{automata::XmlContentModel, dict::XmlAtom};

use super::{XmlAttributeDecl, XmlAttributeType, XmlElementContent};

/// The kind of content an element declaration allows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlElementTypeVal {
    /// Only referenced by an ATTLIST so far.
    #[default]
    XmlElementTypeUndefined = 0,
    XmlElementTypeEmpty = 1,
    XmlElementTypeAny,
    XmlElementTypeMixed,
    XmlElementTypeElement,
}

/// An element type, declared or only referenced by an attribute-list declaration.
#[derive(Debug, Clone)]
pub struct XmlElementDecl {
    pub name: XmlAtom,
    pub etype: XmlElementTypeVal,
    pub content: Option<XmlElementContent>,
    attributes: Vec<XmlAttributeDecl>,
    pub(crate) cont_model: Option<Rc<XmlContentModel>>,
}

impl XmlElementDecl {
    pub(crate) fn new(name: XmlAtom) -> Self {
        Self {
            name,
            etype: XmlElementTypeVal::XmlElementTypeUndefined,
            content: None,
            attributes: vec![],
            cont_model: None,
        }
    }

    /// Check if an ELEMENT declaration was seen for this type.
    pub fn is_declared(&self) -> bool {
        self.etype != XmlElementTypeVal::XmlElementTypeUndefined
    }

    /// The compiled content model, if this type is checked.
    pub fn content_model(&self) -> Option<&Rc<XmlContentModel>> {
        self.cont_model.as_ref()
    }

    pub fn attributes(&self) -> &[XmlAttributeDecl] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&XmlAttributeDecl> {
        self.attributes.iter().find(|attr| *attr.name == *name)
    }

    /// The attribute declared with type ID, if any.
    pub fn id_attribute(&self) -> Option<&XmlAttributeDecl> {
        self.attributes
            .iter()
            .find(|attr| attr.atype == XmlAttributeType::XmlAttributeID)
    }

    /// Add an attribute declaration.
    ///
    /// The first declaration is binding; returns `false` if `attr` was
    /// already declared and has been dropped.
    pub(crate) fn add_attribute(&mut self, attr: XmlAttributeDecl) -> bool {
        if self.attribute(&attr.name).is_some() {
            return false;
        }
        self.attributes.push(attr);
        true
    }
}
