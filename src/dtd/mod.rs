//! Bookkeeping of the declarations of one document type.
//!
//! Element types live in an arena owned by [`XmlDtd`] and are addressed by
//! index; the name table maps interned qualified names to those indices.

mod attribute;
mod content;
mod element;
mod entity;

use std::collections::{HashMap, HashSet};

pub use attribute::{XmlAttributeDecl, XmlAttributeDefault, XmlAttributeType};
pub use content::{XmlElementContent, XmlElementContentOccur, XmlElementContentType};
pub use element::{XmlElementDecl, XmlElementTypeVal};
pub use entity::{XmlEntity, XmlEntityType, XmlNotation, xml_get_predefined_entity};

use crate::dict::XmlAtom;

/// Where a document stands with respect to its document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlDtdState {
    /// The document has no DOCTYPE declaration.
    #[default]
    NoDTD,
    /// Declarations are still being read.
    SubsetOpen,
    /// Both subsets have been read and reconciled.
    SubsetClosed,
    /// The end of the document was reached and the queued references were checked.
    Validated,
}

/// The kind of a reference checked once the whole document is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlRefKind {
    /// An IDREF or IDREFS token.
    Id,
    /// An ENTITY or ENTITIES token.
    Entity,
}

/// A reference queued for the second pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPendingRef {
    pub kind: XmlRefKind,
    pub value: String,
    pub element: String,
    pub attribute: String,
    pub file: Option<String>,
    pub line: usize,
    pub col: usize,
}

/// A notation named by an attribute type before being declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNotationUse {
    pub notation: String,
    pub element: String,
    pub attribute: String,
}

/// The declarations of one document and the state needed to check
/// instances against them.
#[derive(Debug, Default)]
pub struct XmlDtd {
    /// The root element name from the DOCTYPE declaration.
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub system_id: Option<String>,
    pub(crate) state: XmlDtdState,
    elements: Vec<XmlElementDecl>,
    element_index: HashMap<XmlAtom, usize>,
    entities: HashMap<String, XmlEntity>,
    pentities: HashMap<String, XmlEntity>,
    notations: HashMap<String, XmlNotation>,
    ids: HashSet<String>,
    refs: Vec<XmlPendingRef>,
    notation_uses: Vec<XmlNotationUse>,
    /// The declared root name, until the actual root element is seen.
    pub(crate) root_name: Option<String>,
}

impl XmlDtd {
    pub fn new(name: Option<&str>, external_id: Option<&str>, system_id: Option<&str>) -> Self {
        Self {
            name: name.map(|s| s.to_owned()),
            external_id: external_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
            state: XmlDtdState::SubsetOpen,
            root_name: name.map(|s| s.to_owned()),
            ..Default::default()
        }
    }

    pub fn state(&self) -> XmlDtdState {
        self.state
    }

    /// Look up an element type, creating an undefined one if needed.
    ///
    /// Returns its index in the arena.
    pub fn get_or_insert_element(&mut self, name: XmlAtom) -> usize {
        if let Some(&index) = self.element_index.get(&name) {
            return index;
        }
        let index = self.elements.len();
        self.elements.push(XmlElementDecl::new(name.clone()));
        self.element_index.insert(name, index);
        index
    }

    pub fn element_index(&self, name: &XmlAtom) -> Option<usize> {
        self.element_index.get(name).copied()
    }

    pub fn element(&self, name: &XmlAtom) -> Option<&XmlElementDecl> {
        self.element_index(name).map(|i| &self.elements[i])
    }

    pub fn element_at(&self, index: usize) -> Option<&XmlElementDecl> {
        self.elements.get(index)
    }

    pub(crate) fn element_at_mut(&mut self, index: usize) -> Option<&mut XmlElementDecl> {
        self.elements.get_mut(index)
    }

    /// Every element type, in order of first mention.
    pub fn elements(&self) -> &[XmlElementDecl] {
        &self.elements
    }

    /// Element types referenced by an ATTLIST but never declared.
    pub fn undeclared_elements(&self) -> impl Iterator<Item = &XmlElementDecl> {
        self.elements.iter().filter(|elem| !elem.is_declared())
    }

    /// Register an entity. The first declaration is binding.
    ///
    /// Returns `false` if an entity of that name already exists.
    pub fn add_entity(&mut self, entity: XmlEntity) -> bool {
        let table = if entity.etype.is_parameter() {
            &mut self.pentities
        } else {
            &mut self.entities
        };
        if table.contains_key(&entity.name) {
            return false;
        }
        table.insert(entity.name.clone(), entity);
        true
    }

    pub fn get_entity(&self, name: &str) -> Option<&XmlEntity> {
        self.entities.get(name)
    }

    /// The general entities, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &XmlEntity> {
        self.entities.values()
    }

    pub fn get_parameter_entity(&self, name: &str) -> Option<&XmlEntity> {
        self.pentities.get(name)
    }

    /// Register a notation.
    ///
    /// Returns `false` if it was already declared.
    pub fn add_notation(&mut self, notation: XmlNotation) -> bool {
        if self.notations.contains_key(&notation.name) {
            return false;
        }
        self.notations.insert(notation.name.clone(), notation);
        true
    }

    pub fn get_notation(&self, name: &str) -> Option<&XmlNotation> {
        self.notations.get(name)
    }

    /// Remember a notation named in an attribute type.
    pub(crate) fn use_notation(&mut self, notation: &str, element: &str, attribute: &str) {
        self.notation_uses.push(XmlNotationUse {
            notation: notation.to_owned(),
            element: element.to_owned(),
            attribute: attribute.to_owned(),
        });
    }

    /// Notations named in attribute types and never declared.
    pub fn undeclared_notations(&self) -> impl Iterator<Item = &XmlNotationUse> {
        self.notation_uses
            .iter()
            .filter(|u| !self.notations.contains_key(&u.notation))
    }

    /// Record an ID value.
    ///
    /// Returns `false` if the value was already used.
    pub fn add_id(&mut self, value: &str) -> bool {
        if self.ids.contains(value) {
            return false;
        }
        self.ids.insert(value.to_owned());
        true
    }

    pub fn has_id(&self, value: &str) -> bool {
        self.ids.contains(value)
    }

    pub(crate) fn queue_ref(&mut self, pending: XmlPendingRef) {
        self.refs.push(pending);
    }

    pub(crate) fn take_refs(&mut self) -> Vec<XmlPendingRef> {
        std::mem::take(&mut self.refs)
    }
}
