mod common;

use common::parse_resolved;
use exml_reader::{
    XmlErrorKind,
    error::XmlParserErrors,
    parser::{XmlMemoryResolver, XmlParserOption},
};

const XINCLUDE: i32 = XmlParserOption::XmlParseXInclude as i32;
const DOC_URI: &str = "file:///data/main.xml";

fn resolver(files: &[(&str, &str)]) -> XmlMemoryResolver {
    let mut resolver = XmlMemoryResolver::new();
    for (uri, content) in files {
        resolver.add(*uri, *content);
    }
    resolver
}

fn document(body: &str) -> String {
    format!(r#"<doc xmlns:xi="http://www.w3.org/2001/XInclude">{body}</doc>"#)
}

#[test]
fn included_elements_replace_the_include() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<a/><xi:include href="inc.xml"/><b/>"#),
        resolver(&[("file:///data/inc.xml", "<?xml version=\"1.0\"?>\n<r><s>in</s></r>")]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "a", "r", "s", "b"]);
    assert_eq!(outcome.text(), "in");
    // the included document does not start a new document
    assert_eq!(
        outcome
            .trace()
            .iter()
            .filter(|line| line.starts_with("SAX.startDocument"))
            .count(),
        1
    );
}

#[test]
fn nested_includes_resolve_against_their_own_base() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:include href="inc.xml"/>"#),
        resolver(&[
            (
                "file:///data/inc.xml",
                r#"<r xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="sub/inner.xml"/></r>"#,
            ),
            ("file:///data/sub/inner.xml", "<leaf/>"),
        ]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "r", "leaf"]);
}

#[test]
fn text_inclusion() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"[<xi:include href="note.txt" parse="text"/>]"#),
        resolver(&[("file:///data/note.txt", "a < b & c\r\n")]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc"]);
    assert_eq!(outcome.text(), "[a < b & c\n]");
}

#[test]
fn fallback_is_used_when_the_resource_is_missing() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(
            r#"<xi:include href="missing.xml"><xi:fallback><alt>none</alt></xi:fallback></xi:include>"#,
        ),
        resolver(&[]),
    );
    outcome.result.as_ref().unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());
    assert_eq!(outcome.start_elements(), ["doc", "alt"]);
    assert_eq!(outcome.text(), "none");
}

#[test]
fn fallback_is_dropped_when_the_resource_loads() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:include href="inc.xml"><xi:fallback><alt/></xi:fallback></xi:include>"#),
        resolver(&[("file:///data/inc.xml", "<r/>")]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "r"]);
}

#[test]
fn missing_resource_without_fallback() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:include href="missing.xml"/><after/>"#),
        resolver(&[]),
    );
    outcome.result.as_ref().unwrap();
    let errors = outcome.errors.with_code(XmlParserErrors::XmlXIncludeNoFallback);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), XmlErrorKind::Resource);
    assert_eq!(outcome.start_elements(), ["doc", "after"]);
}

#[test]
fn recursion_is_fatal() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:include href="main.xml"/>"#),
        resolver(&[("file:///data/main.xml", "<doc/>")]),
    );
    let error = outcome.result.unwrap_err();
    assert_eq!(error.code, XmlParserErrors::XmlXIncludeRecursion);
}

#[test]
fn misplaced_elements_are_reported() {
    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:fallback><hidden/></xi:fallback><shown/>"#),
        resolver(&[]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(
        outcome
            .errors
            .with_code(XmlParserErrors::XmlXIncludeFallbackNotInInclude)
            .len(),
        1
    );
    assert_eq!(outcome.start_elements(), ["doc", "shown"]);

    let outcome = parse_resolved(
        XINCLUDE,
        DOC_URI,
        &document(r#"<xi:include href="inc.xml" xpointer="xpointer(/r)"/>"#),
        resolver(&[("file:///data/inc.xml", "<r/>")]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(
        outcome
            .errors
            .with_code(XmlParserErrors::XmlXIncludeXPtrFailed)
            .len(),
        1
    );
}

#[test]
fn includes_are_plain_elements_without_the_option() {
    let outcome = parse_resolved(
        0,
        DOC_URI,
        &document(r#"<xi:include href="inc.xml"/>"#),
        resolver(&[("file:///data/inc.xml", "<r/>")]),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "xi:include"]);
}
