mod common;

use common::{Outcome, parse_resolved};
use exml_reader::{
    XML_XML_NAMESPACE,
    parser::{XmlEvent, XmlMemoryResolver, XmlParserOption},
};

const DOC_URI: &str = "file:///data/main.xml";

/// The `xml:{local}` attributes of every `element` start tag, with their
/// `specified` flag.
fn xml_attributes(outcome: &Outcome, element: &str, local: &str) -> Vec<Option<(String, bool)>> {
    outcome
        .events
        .iter()
        .filter_map(|e| match e {
            XmlEvent::StartElement { name, attributes } if name.local_name() == element => Some(
                attributes
                    .iter()
                    .find(|a| a.name.is(Some(XML_XML_NAMESPACE), local))
                    .map(|a| (a.value.to_string(), a.specified)),
            ),
            _ => None,
        })
        .collect()
}

fn entity_resolver() -> XmlMemoryResolver {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add("file:///data/sub/ext.xml", "<x>text</x>");
    resolver
}

#[test]
fn external_entity_in_another_directory() {
    let doc = r#"<!DOCTYPE doc [<!ENTITY ext SYSTEM "sub/ext.xml">]><doc>&ext;</doc>"#;
    let outcome = parse_resolved(0, DOC_URI, doc, entity_resolver());
    outcome.result.as_ref().unwrap();
    assert_eq!(
        xml_attributes(&outcome, "x", "base"),
        [Some(("file:///data/sub/ext.xml".to_owned(), false))]
    );
    assert_eq!(outcome.text(), "text");
    // the document element itself is not touched
    assert_eq!(xml_attributes(&outcome, "doc", "base"), [None]);
}

#[test]
fn base_fixup_can_be_disabled() {
    let doc = r#"<!DOCTYPE doc [<!ENTITY ext SYSTEM "sub/ext.xml">]><doc>&ext;</doc>"#;
    let outcome = parse_resolved(
        XmlParserOption::XmlParseNoBaseFix as i32,
        DOC_URI,
        doc,
        entity_resolver(),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(xml_attributes(&outcome, "x", "base"), [None]);
}

#[test]
fn explicit_base_is_kept() {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add("file:///data/sub/ext.xml", r#"<x xml:base="elsewhere/">text</x>"#);
    let doc = r#"<!DOCTYPE doc [<!ENTITY ext SYSTEM "sub/ext.xml">]><doc>&ext;</doc>"#;
    let outcome = parse_resolved(0, DOC_URI, doc, resolver);
    outcome.result.as_ref().unwrap();
    assert_eq!(
        xml_attributes(&outcome, "x", "base"),
        [Some(("elsewhere/".to_owned(), true))]
    );
}

#[test]
fn internal_entity_follows_the_including_base() {
    let doc = r#"<!DOCTYPE doc [<!ENTITY e "<x/>">]>
<doc><p xml:base="one/">&e;</p><p xml:base="two/">&e;</p>&e;</doc>"#;
    let outcome = parse_resolved(0, DOC_URI, doc, XmlMemoryResolver::new());
    outcome.result.as_ref().unwrap();
    assert_eq!(
        xml_attributes(&outcome, "x", "base"),
        [
            Some(("file:///data/one/".to_owned(), false)),
            Some(("file:///data/two/".to_owned(), false)),
            None,
        ]
    );
}

#[test]
fn top_level_elements_of_an_entity_are_fixed() {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add("file:///data/sub/ext.xml", "<x><y/></x><x/>");
    let doc = r#"<!DOCTYPE doc [<!ENTITY ext SYSTEM "sub/ext.xml">]><doc>&ext;</doc>"#;
    let outcome = parse_resolved(0, DOC_URI, doc, resolver);
    outcome.result.as_ref().unwrap();
    assert_eq!(xml_attributes(&outcome, "y", "base"), [None]);
    let bases = xml_attributes(&outcome, "x", "base");
    assert_eq!(bases.len(), 2);
    assert!(bases.iter().all(|base| base.is_some()));
}

#[cfg(feature = "xinclude")]
mod xinclude {
    use super::*;

    const XINCLUDE: i32 = XmlParserOption::XmlParseXInclude as i32;

    fn included(content: &str) -> XmlMemoryResolver {
        let mut resolver = XmlMemoryResolver::new();
        resolver.add("file:///data/inc.xml", content);
        resolver
    }

    #[test]
    fn included_document_without_language() {
        let doc = r#"<doc xml:lang="en" xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="inc.xml"/></doc>"#;
        let outcome = parse_resolved(XINCLUDE, DOC_URI, doc, included("<r>hi</r>"));
        outcome.result.as_ref().unwrap();
        assert_eq!(outcome.start_elements(), ["doc", "r"]);
        assert_eq!(
            xml_attributes(&outcome, "r", "lang"),
            [Some((String::new(), false))]
        );
        assert_eq!(
            xml_attributes(&outcome, "r", "base"),
            [Some(("file:///data/inc.xml".to_owned(), false))]
        );
    }

    #[test]
    fn included_document_with_its_own_language() {
        let doc = r#"<doc xml:lang="en" xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="inc.xml"/></doc>"#;
        let outcome = parse_resolved(
            XINCLUDE,
            DOC_URI,
            doc,
            included(r#"<r xml:lang="fr">salut</r>"#),
        );
        outcome.result.as_ref().unwrap();
        assert_eq!(
            xml_attributes(&outcome, "r", "lang"),
            [Some(("fr".to_owned(), true))]
        );
    }

    #[test]
    fn same_language_needs_no_fixup() {
        let doc = r#"<doc xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="inc.xml"/></doc>"#;
        let outcome = parse_resolved(XINCLUDE, DOC_URI, doc, included("<r/>"));
        outcome.result.as_ref().unwrap();
        assert_eq!(xml_attributes(&outcome, "r", "lang"), [None]);
    }
}
