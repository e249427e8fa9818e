//! The chain of event consumers sharing one parse.
//!
//! Every filter sees the events of the parse in order. A filter is either a
//! pass-through observer, or the terminal handler after which dispatch
//! stops. Each entry tracks the starts it was handed, so it only sees the
//! ends matching them, and a filter attached in the middle of an element
//! is detached when that element ends.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    dict::{ExpandedName, XmlAtom},
    dtd::{XmlAttributeDefault, XmlAttributeType},
};

/// What the chain does after a filter returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XmlFilterAction {
    #[default]
    Continue,
    /// Do not hand this event to the filters behind.
    StopChain,
}

/// An attribute as delivered to filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: ExpandedName,
    pub value: Rc<str>,
    /// The declared type, if the attribute is declared in the DTD.
    pub atype: Option<XmlAttributeType>,
    /// `false` for values defaulted from the DTD and for synthesized
    /// xml:base and xml:lang attributes.
    pub specified: bool,
}

/// An event as delivered to filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    StartElement {
        name: ExpandedName,
        attributes: Rc<[XmlAttribute]>,
    },
    EndElement {
        name: ExpandedName,
    },
    Characters(Rc<str>),
    IgnorableWhitespace(Rc<str>),
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
    Comment(String),
    StartPrefixMapping {
        prefix: Option<XmlAtom>,
        uri: XmlAtom,
    },
    EndPrefixMapping {
        prefix: Option<XmlAtom>,
    },
    StartCData,
    EndCData,
    StartDoctype {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    EndDoctype,
    ElementDecl {
        name: String,
        /// The content model as written, `EMPTY`, `ANY` or a particle.
        model: String,
    },
    AttributeDecl {
        element: String,
        attribute: String,
        atype: XmlAttributeType,
        def: XmlAttributeDefault,
        tree: Option<Vec<String>>,
        default_value: Option<String>,
    },
    InternalEntityDecl {
        name: String,
        value: String,
    },
    ExternalEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    UnparsedEntityDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
        notation: String,
    },
    NotationDecl {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
    /// A reference that was not expanded. Parameter entities are named
    /// with a leading `%`.
    SkippedEntity(String),
}

impl XmlEvent {
    fn is_start(&self) -> bool {
        matches!(self, Self::StartDocument | Self::StartElement { .. })
    }

    fn is_end(&self) -> bool {
        matches!(self, Self::EndDocument | Self::EndElement { .. })
    }
}

fn opt(s: Option<&str>) -> String {
    s.map_or_else(|| "NULL".to_owned(), |s| s.to_owned())
}

fn truncated(text: &str) -> &str {
    match text.char_indices().nth(30) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// The `SAX.` trace line of an event.
impl fmt::Display for XmlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartDocument => write!(f, "SAX.startDocument()"),
            Self::EndDocument => write!(f, "SAX.endDocument()"),
            Self::StartElement { name, attributes } => {
                write!(
                    f,
                    "SAX.startElementNs({}, {}, {}, {}, {}",
                    name.local_name(),
                    opt(name.prefix().map(|p| p.as_str())),
                    name.namespace_uri()
                        .map_or_else(|| "NULL".to_owned(), |uri| format!("'{uri}'")),
                    attributes.len(),
                    attributes.iter().filter(|a| !a.specified).count()
                )?;
                for attr in attributes.iter() {
                    write!(f, ", {}='{}'", attr.name.qualified_name(), attr.value)?;
                }
                write!(f, ")")
            }
            Self::EndElement { name } => write!(
                f,
                "SAX.endElementNs({}, {}, {})",
                name.local_name(),
                opt(name.prefix().map(|p| p.as_str())),
                name.namespace_uri()
                    .map_or_else(|| "NULL".to_owned(), |uri| format!("'{uri}'"))
            ),
            Self::Characters(text) => {
                write!(f, "SAX.characters({}, {})", truncated(text), text.len())
            }
            Self::IgnorableWhitespace(text) => {
                write!(
                    f,
                    "SAX.ignorableWhitespace({}, {})",
                    truncated(text),
                    text.len()
                )
            }
            Self::ProcessingInstruction { target, data } => write!(
                f,
                "SAX.processingInstruction({target}, {})",
                opt(data.as_deref())
            ),
            Self::Comment(text) => write!(f, "SAX.comment({text})"),
            Self::StartPrefixMapping { prefix, uri } => write!(
                f,
                "SAX.startPrefixMapping({}, {uri})",
                opt(prefix.as_ref().map(|p| p.as_str()))
            ),
            Self::EndPrefixMapping { prefix } => write!(
                f,
                "SAX.endPrefixMapping({})",
                opt(prefix.as_ref().map(|p| p.as_str()))
            ),
            Self::StartCData => write!(f, "SAX.startCDATA()"),
            Self::EndCData => write!(f, "SAX.endCDATA()"),
            Self::StartDoctype {
                name,
                public_id,
                system_id,
            } => write!(
                f,
                "SAX.internalSubset({name}, {}, {})",
                opt(public_id.as_deref()),
                opt(system_id.as_deref())
            ),
            Self::EndDoctype => write!(f, "SAX.endDTD()"),
            Self::ElementDecl { name, model } => {
                write!(f, "SAX.elementDecl({name}, {model})")
            }
            Self::AttributeDecl {
                element,
                attribute,
                atype,
                def,
                tree,
                default_value,
            } => {
                write!(f, "SAX.attributeDecl({element}, {attribute}, {atype}")?;
                if let Some(tree) = tree {
                    write!(f, " ({})", tree.join("|"))?;
                }
                write!(f, ", {def}, {})", opt(default_value.as_deref()))
            }
            Self::InternalEntityDecl { name, value } => {
                write!(f, "SAX.entityDecl({name}, 1, NULL, NULL, {value})")
            }
            Self::ExternalEntityDecl {
                name,
                public_id,
                system_id,
            } => write!(
                f,
                "SAX.entityDecl({name}, 2, {}, {}, NULL)",
                opt(public_id.as_deref()),
                opt(system_id.as_deref())
            ),
            Self::UnparsedEntityDecl {
                name,
                public_id,
                system_id,
                notation,
            } => write!(
                f,
                "SAX.unparsedEntityDecl({name}, {}, {}, {notation})",
                opt(public_id.as_deref()),
                opt(system_id.as_deref())
            ),
            Self::NotationDecl {
                name,
                public_id,
                system_id,
            } => write!(
                f,
                "SAX.notationDecl({name}, {}, {})",
                opt(public_id.as_deref()),
                opt(system_id.as_deref())
            ),
            Self::SkippedEntity(name) => write!(f, "SAX.reference({name})"),
        }
    }
}

/// A consumer of parse events.
///
/// Every callback defaults to doing nothing. [`XmlFilter::handle`] routes an
/// event to its callback; filters that treat all events alike can override
/// it instead.
#[allow(unused_variables)]
pub trait XmlFilter {
    fn start_document(&mut self) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn end_document(&mut self) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn start_element(
        &mut self,
        name: &ExpandedName,
        attributes: &[XmlAttribute],
    ) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn end_element(&mut self, name: &ExpandedName) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn characters(&mut self, text: &str) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn ignorable_whitespace(&mut self, text: &str) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn comment(&mut self, text: &str) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn start_cdata(&mut self) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn end_cdata(&mut self) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn start_doctype(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn end_doctype(&mut self) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    /// Any declaration. The event is one of the `*Decl` variants.
    fn declaration(&mut self, decl: &XmlEvent) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn skipped_entity(&mut self, name: &str) -> XmlFilterAction {
        XmlFilterAction::Continue
    }

    fn handle(&mut self, event: &XmlEvent) -> XmlFilterAction {
        match event {
            XmlEvent::StartDocument => self.start_document(),
            XmlEvent::EndDocument => self.end_document(),
            XmlEvent::StartElement { name, attributes } => self.start_element(name, attributes),
            XmlEvent::EndElement { name } => self.end_element(name),
            XmlEvent::Characters(text) => self.characters(text),
            XmlEvent::IgnorableWhitespace(text) => self.ignorable_whitespace(text),
            XmlEvent::ProcessingInstruction { target, data } => {
                self.processing_instruction(target, data.as_deref())
            }
            XmlEvent::Comment(text) => self.comment(text),
            XmlEvent::StartPrefixMapping { prefix, uri } => {
                self.start_prefix_mapping(prefix.as_ref().map(|p| p.as_str()), uri)
            }
            XmlEvent::EndPrefixMapping { prefix } => {
                self.end_prefix_mapping(prefix.as_ref().map(|p| p.as_str()))
            }
            XmlEvent::StartCData => self.start_cdata(),
            XmlEvent::EndCData => self.end_cdata(),
            XmlEvent::StartDoctype {
                name,
                public_id,
                system_id,
            } => self.start_doctype(name, public_id.as_deref(), system_id.as_deref()),
            XmlEvent::EndDoctype => self.end_doctype(),
            XmlEvent::ElementDecl { .. }
            | XmlEvent::AttributeDecl { .. }
            | XmlEvent::InternalEntityDecl { .. }
            | XmlEvent::ExternalEntityDecl { .. }
            | XmlEvent::UnparsedEntityDecl { .. }
            | XmlEvent::NotationDecl { .. } => self.declaration(event),
            XmlEvent::SkippedEntity(name) => self.skipped_entity(name),
        }
    }
}

struct XmlFilterEntry {
    filter: Box<dyn XmlFilter>,
    /// One entry per open start event, `true` if this filter received it.
    open: Vec<bool>,
    active: bool,
    terminal: bool,
}

/// The ordered filters of one reader.
#[derive(Default)]
pub struct XmlFilterChain {
    entries: Vec<XmlFilterEntry>,
}

impl XmlFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass-through filter.
    pub fn add(&mut self, filter: Box<dyn XmlFilter>) {
        self.push(filter, false);
    }

    /// Append the terminal handler. Filters added after it see no event.
    pub fn add_handler(&mut self, filter: Box<dyn XmlFilter>) {
        self.push(filter, true);
    }

    fn push(&mut self, filter: Box<dyn XmlFilter>, terminal: bool) {
        self.entries.push(XmlFilterEntry {
            filter,
            open: vec![],
            active: true,
            terminal,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of filters still attached.
    pub fn active(&self) -> usize {
        self.entries.iter().filter(|e| e.active).count()
    }

    /// Hand `event` to every active filter in order.
    ///
    /// Filters behind a `StopChain` or the terminal handler do not receive
    /// the event, but still record the start so the matching end is
    /// withheld from them too.
    pub fn dispatch(&mut self, event: &XmlEvent) {
        let mut delivering = true;
        for entry in self.entries.iter_mut() {
            if !entry.active {
                continue;
            }
            if event.is_start() {
                entry.open.push(delivering);
            } else if event.is_end() {
                match entry.open.pop() {
                    // the element this filter was attached in has ended
                    None => {
                        entry.active = false;
                        continue;
                    }
                    Some(false) => {
                        if entry.terminal {
                            delivering = false;
                        }
                        continue;
                    }
                    Some(true) => {}
                }
            }
            if !delivering {
                continue;
            }
            let action = entry.filter.handle(event);
            if entry.terminal || action == XmlFilterAction::StopChain {
                delivering = false;
            }
        }
    }
}

/// A filter that records every event it sees.
///
/// Clones share the same record, so a clone kept by the caller observes
/// what the reader delivered.
#[derive(Debug, Clone, Default)]
pub struct XmlEventCollector {
    events: Rc<RefCell<Vec<XmlEvent>>>,
}

impl XmlEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<XmlEvent> {
        self.events.borrow().clone()
    }

    /// Remove and return the recorded events.
    pub fn take(&self) -> Vec<XmlEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl XmlFilter for XmlEventCollector {
    fn handle(&mut self, event: &XmlEvent) -> XmlFilterAction {
        self.events.borrow_mut().push(event.clone());
        XmlFilterAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::XmlDict;

    struct Counter {
        seen: Rc<RefCell<Vec<String>>>,
        label: &'static str,
        action: XmlFilterAction,
    }

    impl XmlFilter for Counter {
        fn start_element(&mut self, name: &ExpandedName, _: &[XmlAttribute]) -> XmlFilterAction {
            self.seen.borrow_mut().push(format!("{}:<{name}>", self.label));
            self.action
        }

        fn end_element(&mut self, name: &ExpandedName) -> XmlFilterAction {
            self.seen.borrow_mut().push(format!("{}:</{name}>", self.label));
            self.action
        }
    }

    fn start(dict: &mut XmlDict, name: &str) -> XmlEvent {
        XmlEvent::StartElement {
            name: dict.split(name).unwrap(),
            attributes: Rc::from(vec![]),
        }
    }

    fn end(dict: &mut XmlDict, name: &str) -> XmlEvent {
        XmlEvent::EndElement {
            name: dict.split(name).unwrap(),
        }
    }

    #[test]
    fn stop_chain_and_terminal() {
        let mut dict = XmlDict::new();
        let seen = Rc::new(RefCell::new(vec![]));
        let mut chain = XmlFilterChain::new();
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "a",
            action: XmlFilterAction::Continue,
        }));
        chain.add_handler(Box::new(Counter {
            seen: seen.clone(),
            label: "b",
            action: XmlFilterAction::Continue,
        }));
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "c",
            action: XmlFilterAction::Continue,
        }));
        chain.dispatch(&start(&mut dict, "x"));
        assert_eq!(*seen.borrow(), ["a:<x>", "b:<x>"]);

        let seen = Rc::new(RefCell::new(vec![]));
        let mut chain = XmlFilterChain::new();
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "a",
            action: XmlFilterAction::StopChain,
        }));
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "b",
            action: XmlFilterAction::Continue,
        }));
        chain.dispatch(&start(&mut dict, "x"));
        assert_eq!(*seen.borrow(), ["a:<x>"]);
    }

    #[test]
    fn filter_detaches_at_its_own_level() {
        let mut dict = XmlDict::new();
        let seen = Rc::new(RefCell::new(vec![]));
        let mut chain = XmlFilterChain::new();
        // attached while already inside an element
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "a",
            action: XmlFilterAction::Continue,
        }));
        chain.dispatch(&start(&mut dict, "child"));
        chain.dispatch(&end(&mut dict, "child"));
        chain.dispatch(&end(&mut dict, "parent"));
        chain.dispatch(&start(&mut dict, "next"));
        assert_eq!(*seen.borrow(), ["a:<child>", "a:</child>"]);
        assert_eq!(chain.active(), 0);
    }

    #[test]
    fn ends_follow_the_starts_each_filter_received() {
        let mut dict = XmlDict::new();
        let seen = Rc::new(RefCell::new(vec![]));
        let mut chain = XmlFilterChain::new();
        chain.add(Box::new(Counter {
            seen: seen.clone(),
            label: "a",
            action: XmlFilterAction::StopChain,
        }));
        chain.add_handler(Box::new(Counter {
            seen: seen.clone(),
            label: "b",
            action: XmlFilterAction::Continue,
        }));
        chain.dispatch(&XmlEvent::StartDocument);
        chain.dispatch(&start(&mut dict, "x"));
        chain.dispatch(&end(&mut dict, "x"));
        chain.dispatch(&XmlEvent::EndDocument);
        assert_eq!(*seen.borrow(), ["a:<x>", "a:</x>"]);
        assert_eq!(chain.active(), 2);
    }

    #[test]
    fn trace_lines() {
        let mut dict = XmlDict::new();
        let event = start(&mut dict, "doc");
        assert_eq!(event.to_string(), "SAX.startElementNs(doc, NULL, NULL, 0, 0)");
        let event = XmlEvent::Characters(Rc::from("hello"));
        assert_eq!(event.to_string(), "SAX.characters(hello, 5)");
    }
}
