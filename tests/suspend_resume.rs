mod common;

use common::parse;
use exml_reader::parser::{XmlEvent, XmlEventCollector, XmlParseStatus, XmlReader};

const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE doc [
<!ENTITY greeting "hello <b>world</b>">
<!ATTLIST doc lang CDATA "fr">
]>
<!-- prolog -->
<doc xmlns="urn:doc" xmlns:p="urn:p">
  <p:item id="1">caf&#233; au lait</p:item>
  <?target some data?>
  <![CDATA[<not markup>]]>
  <item>&greeting; and &amp; more</item>
  <empty/>
</doc>
"#;

fn trace(events: &[XmlEvent]) -> Vec<String> {
    events.iter().map(|e| e.to_string()).collect()
}

fn reference() -> Vec<String> {
    let outcome = parse(0, DOC);
    outcome.result.as_ref().unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());
    outcome.trace()
}

#[test]
fn chunk_size_does_not_change_the_events() {
    let expected = reference();
    for size in [1, 2, 3, 5, 7, 13, 64, 4096] {
        let collector = XmlEventCollector::new();
        let mut reader = XmlReader::new();
        reader.add_handler(collector.clone());
        let bytes = DOC.as_bytes();
        let mut chunks = bytes.chunks(size).peekable();
        let mut status = XmlParseStatus::Parsing;
        while let Some(chunk) = chunks.next() {
            status = reader.parse_chunk(chunk, chunks.peek().is_none()).unwrap();
        }
        assert_eq!(status, XmlParseStatus::Finished, "chunk size {size}");
        assert_eq!(trace(&collector.take()), expected, "chunk size {size}");
    }
}

#[test]
fn partial_input_waits_for_more() {
    let collector = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_handler(collector.clone());
    assert_eq!(
        reader.parse_chunk(b"<doc><a>te", false).unwrap(),
        XmlParseStatus::Parsing
    );
    assert_eq!(
        reader.parse_chunk(b"xt</a></doc>", true).unwrap(),
        XmlParseStatus::Finished
    );
    let text: String = collector
        .events()
        .iter()
        .filter_map(|e| match e {
            XmlEvent::Characters(text) => Some(text.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "text");
}

#[test]
fn truncated_document_is_an_error() {
    let mut reader = XmlReader::new();
    assert!(reader.parse_chunk(b"<doc><a>", true).is_err());
    assert!(reader.diagnostics().nb_errors() > 0);
}

#[test]
fn step_mode_suspends_after_each_event() {
    let collector = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_handler(collector.clone());
    reader.set_step_mode(true);
    let mut status = reader.parse_chunk(DOC.as_bytes(), true).unwrap();
    let mut steps = 0;
    while status == XmlParseStatus::Suspended {
        steps += 1;
        status = reader.resume().unwrap();
    }
    assert_eq!(status, XmlParseStatus::Finished);
    assert!(steps > 10, "only {steps} steps");
    assert_eq!(trace(&collector.take()), reference());
}

#[test]
fn event_reader_matches_a_full_parse() {
    let events = XmlReader::new()
        .events(DOC)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(trace(&events), reference());
}

#[test]
fn event_reader_ends_with_the_error() {
    let mut events = XmlReader::new().events("<doc><a></b></doc>");
    let mut seen = vec![];
    let error = loop {
        match events.next() {
            Some(Ok(event)) => seen.push(event),
            Some(Err(error)) => break error,
            None => panic!("the parse did not fail"),
        }
    };
    assert!(matches!(error.kind(), exml_reader::XmlErrorKind::WellFormedness));
    assert!(events.next().is_none());
    assert!(matches!(seen[0], XmlEvent::StartDocument));
}

#[test]
fn stop_ends_the_parse() {
    let collector = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_handler(collector.clone());
    reader.set_step_mode(true);
    assert_eq!(
        reader.parse_chunk(b"<doc><a/><b/><c/></doc>", true).unwrap(),
        XmlParseStatus::Suspended
    );
    reader.resume().unwrap();
    reader.stop();
    let seen = collector.len();
    assert_eq!(reader.resume().unwrap(), XmlParseStatus::Stopped);
    assert_eq!(
        reader.parse_chunk(b"<more/>", true).unwrap(),
        XmlParseStatus::Stopped
    );
    assert_eq!(collector.len(), seen);
    assert!(
        collector
            .events()
            .iter()
            .all(|e| !matches!(e, XmlEvent::EndDocument))
    );

    // reset makes the reader usable again
    reader.reset();
    reader.set_step_mode(false);
    collector.take();
    reader.parse_bytes(None, b"<other/>").unwrap();
    assert_eq!(collector.len(), 4);
}

#[test]
fn finished_reader_starts_a_new_document() {
    let collector = XmlEventCollector::new();
    let mut reader = XmlReader::new();
    reader.add_handler(collector.clone());
    assert_eq!(
        reader.parse_chunk(b"<one/>", true).unwrap(),
        XmlParseStatus::Finished
    );
    assert_eq!(reader.resume().unwrap(), XmlParseStatus::Finished);
    assert_eq!(
        reader.parse_chunk(b"<two/>", true).unwrap(),
        XmlParseStatus::Finished
    );
    let starts = collector
        .events()
        .iter()
        .filter(|e| matches!(e, XmlEvent::StartDocument))
        .count();
    assert_eq!(starts, 2);
}

#[test]
fn entity_text_is_delivered_in_step_mode() {
    let text: String = XmlReader::new()
        .events(r#"<!DOCTYPE d [<!ENTITY e "inner">]><d>a&e;b</d>"#)
        .filter_map(|event| match event {
            Ok(XmlEvent::Characters(text)) => Some(text.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "ainnerb");
}
