#![allow(dead_code)]

use exml_reader::{
    XmlError,
    error::XmlErrorCollector,
    parser::{XmlEntityResolver, XmlEvent, XmlEventCollector, XmlReader},
};

pub struct Outcome {
    pub result: Result<(), XmlError>,
    pub events: Vec<XmlEvent>,
    pub errors: XmlErrorCollector,
}

impl Outcome {
    /// The `SAX.` lines of the events.
    pub fn trace(&self) -> Vec<String> {
        self.events.iter().map(|e| e.to_string()).collect()
    }

    /// The text of every `characters` event, concatenated.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                XmlEvent::Characters(text) => Some(&**text),
                _ => None,
            })
            .collect()
    }

    pub fn start_elements(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                XmlEvent::StartElement { name, .. } => Some(name.qualified_name().to_string()),
                _ => None,
            })
            .collect()
    }
}

pub fn parse_with(
    options: i32,
    uri: Option<&str>,
    doc: &str,
    resolver: Option<Box<dyn FnOnce(&mut XmlReader)>>,
) -> Outcome {
    let events = XmlEventCollector::new();
    let errors = XmlErrorCollector::new();
    let mut reader = XmlReader::with_options(options);
    reader.set_error_handler(errors.clone());
    reader.add_handler(events.clone());
    if let Some(configure) = resolver {
        configure(&mut reader);
    }
    let result = reader.parse_bytes(uri, doc.as_bytes());
    Outcome {
        result,
        events: events.take(),
        errors,
    }
}

/// Parse with an error collector attached.
pub fn parse(options: i32, doc: &str) -> Outcome {
    parse_with(options, None, doc, None)
}

/// Parse with an error collector attached and `resolver` serving entities.
pub fn parse_resolved(
    options: i32,
    uri: &str,
    doc: &str,
    resolver: impl XmlEntityResolver + 'static,
) -> Outcome {
    parse_with(
        options,
        Some(uri),
        doc,
        Some(Box::new(move |reader: &mut XmlReader| {
            reader.set_entity_resolver(resolver)
        })),
    )
}
