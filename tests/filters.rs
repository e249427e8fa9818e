use std::{cell::RefCell, rc::Rc};

use exml_reader::{
    ExpandedName,
    parser::{
        XmlAttribute, XmlEvent, XmlEventCollector, XmlFilter, XmlFilterAction, XmlParseStatus,
        XmlReader,
    },
};

/// Hides comments from the filters behind it.
struct DropComments;

impl XmlFilter for DropComments {
    fn comment(&mut self, _text: &str) -> XmlFilterAction {
        XmlFilterAction::StopChain
    }
}

/// Records element names through the typed callbacks.
#[derive(Default, Clone)]
struct Outline {
    lines: Rc<RefCell<Vec<String>>>,
}

impl XmlFilter for Outline {
    fn start_element(&mut self, name: &ExpandedName, attributes: &[XmlAttribute]) -> XmlFilterAction {
        self.lines
            .borrow_mut()
            .push(format!("<{} {}>", name.qualified_name(), attributes.len()));
        XmlFilterAction::Continue
    }

    fn end_element(&mut self, name: &ExpandedName) -> XmlFilterAction {
        self.lines
            .borrow_mut()
            .push(format!("</{}>", name.qualified_name()));
        XmlFilterAction::Continue
    }

    fn characters(&mut self, text: &str) -> XmlFilterAction {
        self.lines.borrow_mut().push(text.to_owned());
        XmlFilterAction::Continue
    }
}

#[test]
fn stop_chain_hides_the_event_from_later_filters() {
    let before = XmlEventCollector::new();
    let after = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_filter(before.clone());
    reader.add_filter(DropComments);
    reader.add_handler(after.clone());
    reader
        .parse_bytes(None, b"<!--one--><doc><!--two-->text</doc>")
        .unwrap();
    let comments = |events: Vec<XmlEvent>| {
        events
            .iter()
            .filter(|e| matches!(e, XmlEvent::Comment(_)))
            .count()
    };
    assert_eq!(comments(before.events()), 2);
    assert_eq!(comments(after.events()), 0);
    assert_eq!(before.len(), after.len() + 2);
}

#[test]
fn nothing_runs_after_the_handler() {
    let handler = XmlEventCollector::new();
    let late = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_handler(handler.clone());
    reader.add_filter(late.clone());
    reader.parse_bytes(None, b"<doc/>").unwrap();
    assert_eq!(handler.len(), 4);
    assert!(late.is_empty());
}

#[test]
fn typed_callbacks() {
    let outline = Outline::default();
    let mut reader = XmlReader::new();
    reader.add_handler(outline.clone());
    reader
        .parse_bytes(None, br#"<a x="1" y="2"><b>t</b><?pi?><c/></a>"#)
        .unwrap();
    assert_eq!(
        *outline.lines.borrow(),
        ["<a 2>", "<b 0>", "t", "</b>", "<c 0>", "</c>", "</a>"]
    );
}

#[test]
fn filter_attached_inside_an_element_leaves_with_it() {
    let all = XmlEventCollector::new();
    let late = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_filter(all.clone());
    reader.set_step_mode(true);

    let is_start_of_b = |e: &XmlEvent| {
        matches!(e, XmlEvent::StartElement { name, .. } if name.local_name() == "b")
    };
    let mut status = reader
        .parse_chunk(b"<a><b>x<c/>y</b><d/></a>", true)
        .unwrap();
    while status == XmlParseStatus::Suspended && !all.events().iter().any(is_start_of_b) {
        status = reader.resume().unwrap();
    }
    reader.add_filter(late.clone());
    while status == XmlParseStatus::Suspended {
        status = reader.resume().unwrap();
    }
    assert_eq!(status, XmlParseStatus::Finished);

    let all = all.events();
    let start = all.iter().position(is_start_of_b).unwrap();
    let end = all
        .iter()
        .position(|e| matches!(e, XmlEvent::EndElement { name } if name.local_name() == "b"))
        .unwrap();
    assert_eq!(late.events(), &all[start + 1..end]);
    assert_eq!(reader.active_filters(), 1);
}

#[test]
fn trace_of_a_small_document() {
    let trace = XmlReader::new()
        .events(&b"<?xml version=\"1.0\"?>\n<!--c-->\n<doc a=\"1\"><?pi x?>t</doc>"[..])
        .map(|event| event.map(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        trace,
        [
            "SAX.startDocument()",
            "SAX.comment(c)",
            "SAX.startElementNs(doc, NULL, NULL, 1, 0, a='1')",
            "SAX.processingInstruction(pi, x)",
            "SAX.characters(t, 1)",
            "SAX.endElementNs(doc, NULL, NULL)",
            "SAX.endDocument()",
        ]
    );
}

/// Hides `secret` start tags from the filters behind it.
struct HideSecretStarts;

impl XmlFilter for HideSecretStarts {
    fn start_element(&mut self, name: &ExpandedName, _: &[XmlAttribute]) -> XmlFilterAction {
        if name.local_name() == "secret" {
            XmlFilterAction::StopChain
        } else {
            XmlFilterAction::Continue
        }
    }
}

#[test]
fn end_tags_follow_the_start_tags_a_filter_saw() {
    let handler = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_filter(HideSecretStarts);
    reader.add_handler(handler.clone());
    reader
        .parse_bytes(None, b"<doc><secret/><x/></doc>")
        .unwrap();
    let trace = handler
        .events()
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        trace,
        [
            "SAX.startDocument()",
            "SAX.startElementNs(doc, NULL, NULL, 0, 0)",
            "SAX.startElementNs(x, NULL, NULL, 0, 0)",
            "SAX.endElementNs(x, NULL, NULL)",
            "SAX.endElementNs(doc, NULL, NULL)",
            "SAX.endDocument()",
        ]
    );
    assert_eq!(reader.active_filters(), 2);
}
