//! The boundary between the engine and a token-level scanner.
//!
//! A scanner turns the bytes of one entity into [`XmlScanEvent`]s and hands
//! them to an [`XmlScanHandler`] one at a time. After each event the handler
//! tells the scanner whether to go on, to suspend (keeping its position) or
//! to stop for good.

use std::rc::Rc;

use crate::{
    dtd::{
        XmlAttributeDefault, XmlAttributeType, XmlElementContent, XmlElementTypeVal,
        XmlEntityType,
    },
    encoding::XmlCharEncodingHandler,
    error::XmlError,
};

/// The position of the event being reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlSAXLocator {
    pub system_id: Option<Rc<str>>,
    pub line: usize,
    pub col: usize,
}

/// An attribute as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlScanAttribute {
    /// The raw encoded name.
    pub name: String,
    /// The value, with references expanded and, for declared non-CDATA
    /// attributes, whitespace normalized.
    pub value: String,
    /// `false` for values defaulted from an attribute-list declaration.
    pub specified: bool,
}

/// The low-level events a scanner produces.
///
/// Element and attribute names are raw encoded names, see
/// [`crate::dict::encode_raw_name`].
#[derive(Debug, Clone, PartialEq)]
pub enum XmlScanEvent {
    StartDocument,
    EndDocument,
    XmlDecl {
        version: Option<String>,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    StartElement {
        name: String,
        attributes: Vec<XmlScanAttribute>,
    },
    EndElement {
        name: String,
    },
    /// A fragment of character data. A run of text may be split in any
    /// number of fragments.
    Characters(String),
    StartCData,
    EndCData,
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
    Comment(String),
    StartNamespaceDecl {
        prefix: Option<String>,
        uri: String,
    },
    EndNamespaceDecl {
        prefix: Option<String>,
    },
    StartDoctypeDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
        has_internal_subset: bool,
    },
    /// The end of the internal subset, or of a DOCTYPE without one.
    EndDoctypeDecl,
    ElementDecl {
        name: String,
        etype: XmlElementTypeVal,
        content: Option<XmlElementContent>,
    },
    AttlistDecl {
        element: String,
        attribute: String,
        atype: XmlAttributeType,
        def: XmlAttributeDefault,
        tree: Option<Vec<String>>,
        default_value: Option<String>,
    },
    EntityDecl {
        name: String,
        etype: XmlEntityType,
        value: Option<String>,
        public_id: Option<String>,
        system_id: Option<String>,
        notation: Option<String>,
    },
    NotationDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    /// A reference the scanner does not expand itself: a general entity
    /// other than the predefined ones in content, or a parameter entity
    /// between declarations.
    EntityReference {
        name: String,
        is_parameter: bool,
    },
}

impl XmlScanEvent {
    /// Check if this event ends the current run of character data.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::Characters(_) | Self::EntityReference { .. } | Self::XmlDecl { .. }
        )
    }
}

/// What the handler wants the scanner to do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlScanControl {
    Continue,
    /// Keep the position and return; [`XmlScanner::resume`] continues.
    Suspend,
    /// Abort. No further event is reported.
    Stop,
}

/// The state of a scanner after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlScanStatus {
    /// Every available byte was consumed; more input is expected.
    #[default]
    Parsing,
    Suspended,
    /// The whole entity was read.
    Finished,
    Stopped,
}

/// What kind of text a scanner reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlScanMode {
    /// A complete document.
    Document,
    /// The replacement text of a general entity.
    Content,
    /// External subset or parameter-entity text.
    Dtd,
}

/// The input of a nested scanner.
#[derive(Debug, Clone, Default)]
pub struct XmlEntityInput {
    pub system_id: Option<String>,
    /// Replacement text of an internal entity, already decoded.
    pub internal: bool,
    /// Parameter-entity text referenced from the internal subset.
    pub in_internal_subset: bool,
}

/// The receiver of scanner events.
pub trait XmlScanHandler {
    fn process_event(&mut self, event: &XmlScanEvent, loc: &XmlSAXLocator) -> XmlScanControl;

    /// Called for an encoding the scanner has no decoder for.
    fn unknown_encoding(&mut self, name: &str) -> Option<XmlCharEncodingHandler> {
        let _ = name;
        None
    }

    /// A recoverable problem found by the scanner.
    fn warning(&mut self, error: XmlError) -> XmlScanControl {
        log::warn!("{error}");
        XmlScanControl::Continue
    }
}

/// A token-level scanner.
pub trait XmlScanner {
    /// Append input. Nothing is scanned until the next call to
    /// [`XmlScanner::resume`].
    fn feed(&mut self, chunk: &[u8], terminate: bool);

    /// Scan until the input is exhausted, the handler suspends or stops, or
    /// a well-formedness error is found.
    fn resume(&mut self, handler: &mut dyn XmlScanHandler) -> Result<XmlScanStatus, XmlError>;

    /// Feed `chunk` and scan it.
    fn parse(
        &mut self,
        handler: &mut dyn XmlScanHandler,
        chunk: &[u8],
        terminate: bool,
    ) -> Result<XmlScanStatus, XmlError> {
        self.feed(chunk, terminate);
        self.resume(handler)
    }

    /// Abort scanning. No event is reported afterwards.
    fn stop(&mut self);

    fn status(&self) -> XmlScanStatus;

    /// The current position.
    fn locator(&self) -> XmlSAXLocator;

    /// Build the scanner of an entity or inclusion referenced from the
    /// current position.
    fn create_entity_scanner(&self, mode: XmlScanMode, input: XmlEntityInput)
    -> Box<dyn XmlScanner>;
}
