mod common;

use common::{parse, parse_resolved};
use exml_reader::{
    error::{XmlErrorLevel, XmlParserErrors},
    parser::{XmlEvent, XmlMemoryResolver, XmlParserOption},
};

const DOC_URI: &str = "file:///data/doc.xml";
const VALID: i32 = XmlParserOption::XmlParseDTDValid as i32;

fn skipped(outcome: &common::Outcome) -> Vec<String> {
    outcome
        .events
        .iter()
        .filter_map(|e| match e {
            XmlEvent::SkippedEntity(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn predefined_and_character_references() {
    let outcome = parse(0, "<doc>&lt;&gt;&amp;&apos;&quot; &#65;&#x42;</doc>");
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.text(), "<>&'\" AB");
}

#[test]
fn internal_entities_nest() {
    let outcome = parse(
        0,
        r#"<!DOCTYPE doc [
<!ENTITY inner "<i>deep</i>">
<!ENTITY outer "[&inner;]">
]><doc>&outer;</doc>"#,
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "i"]);
    assert_eq!(outcome.text(), "[deep]");
}

#[test]
fn entity_loops_are_fatal() {
    let outcome = parse(
        0,
        r#"<!DOCTYPE doc [<!ENTITY a "x&b;"><!ENTITY b "y&a;">]><doc>&a;</doc>"#,
    );
    let error = outcome.result.unwrap_err();
    assert_eq!(error.code, XmlParserErrors::XmlErrEntityLoop);
}

#[test]
fn unparsed_entity_in_content_is_fatal() {
    let outcome = parse(
        0,
        r#"<!DOCTYPE doc [<!NOTATION gif SYSTEM "viewer"><!ENTITY pic SYSTEM "pic.gif" NDATA gif>]><doc>&pic;</doc>"#,
    );
    let error = outcome.result.unwrap_err();
    assert_eq!(error.code, XmlParserErrors::XmlErrUnparsedEntity);
}

#[test]
fn undeclared_entity_in_a_standalone_document() {
    let outcome = parse(0, "<?xml version='1.0' standalone='yes'?><doc>&nope;</doc>");
    let error = outcome.result.unwrap_err();
    assert_eq!(error.code, XmlParserErrors::XmlErrUndeclaredEntity);
    assert_eq!(error.level, XmlErrorLevel::XmlErrFatal);

    // no DTD at all is the same
    let outcome = parse(0, "<doc>&nope;</doc>");
    assert!(outcome.result.is_err());
}

#[test]
fn undeclared_entity_with_an_external_subset() {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add("file:///data/doc.dtd", "<!ELEMENT doc (#PCDATA)>");
    let outcome = parse_resolved(
        0,
        DOC_URI,
        r#"<!DOCTYPE doc SYSTEM "doc.dtd"><doc>a&nope;b</doc>"#,
        resolver.clone(),
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(skipped(&outcome), ["nope"]);
    let warnings = outcome
        .errors
        .with_code(XmlParserErrors::XmlWarUndeclaredEntity);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].level, XmlErrorLevel::XmlErrWarning);
    assert_eq!(outcome.text(), "ab");

    // a validating parse also reports the reference as invalid
    let outcome = parse_resolved(
        VALID,
        DOC_URI,
        r#"<!DOCTYPE doc SYSTEM "doc.dtd"><doc>a&nope;b</doc>"#,
        resolver,
    );
    outcome.result.as_ref().unwrap();
    let errors = outcome
        .errors
        .with_code(XmlParserErrors::XmlErrUndeclaredEntity);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, XmlErrorLevel::XmlErrError);
}

#[test]
fn external_entities_are_loaded_relative_to_the_document() {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add(
        "file:///data/parts/part.xml",
        "<?xml version='1.0' encoding='UTF-8'?><part>body</part>",
    );
    let outcome = parse_resolved(
        0,
        DOC_URI,
        r#"<!DOCTYPE doc [<!ENTITY part SYSTEM "parts/part.xml">]><doc>&part;</doc>"#,
        resolver,
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.start_elements(), ["doc", "part"]);
    assert_eq!(outcome.text(), "body");
}

#[test]
fn missing_external_entity_is_skipped() {
    let outcome = parse_resolved(
        0,
        DOC_URI,
        r#"<!DOCTYPE doc [<!ENTITY gone SYSTEM "gone.xml">]><doc>&gone;<after/></doc>"#,
        XmlMemoryResolver::new(),
    );
    outcome.result.as_ref().unwrap();
    let errors = outcome.errors.with_code(XmlParserErrors::XmlIOLoadError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, XmlErrorLevel::XmlErrError);
    assert_eq!(skipped(&outcome), ["gone"]);
    assert_eq!(outcome.start_elements(), ["doc", "after"]);
}

#[test]
fn missing_external_subset_is_a_warning_unless_validating() {
    let doc = r#"<!DOCTYPE doc SYSTEM "absent.dtd"><doc/>"#;
    let outcome = parse_resolved(0, DOC_URI, doc, XmlMemoryResolver::new());
    outcome.result.as_ref().unwrap();
    let errors = outcome.errors.with_code(XmlParserErrors::XmlIOLoadError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, XmlErrorLevel::XmlErrWarning);

    let outcome = parse_resolved(VALID, DOC_URI, doc, XmlMemoryResolver::new());
    let errors = outcome.errors.with_code(XmlParserErrors::XmlIOLoadError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, XmlErrorLevel::XmlErrError);
}

#[test]
fn external_subset_is_not_read_without_external_pes() {
    let mut resolver = XmlMemoryResolver::new();
    resolver.add(
        "file:///data/doc.dtd",
        r#"<!ENTITY greeting "hello">"#,
    );
    let doc = r#"<!DOCTYPE doc SYSTEM "doc.dtd"><doc>&greeting;</doc>"#;

    let outcome = parse_resolved(0, DOC_URI, doc, resolver.clone());
    outcome.result.as_ref().unwrap();
    assert_eq!(outcome.text(), "hello");

    let outcome = parse_resolved(
        XmlParserOption::XmlParseNoExtPE as i32,
        DOC_URI,
        doc,
        resolver,
    );
    outcome.result.as_ref().unwrap();
    assert_eq!(skipped(&outcome), ["greeting"]);
    assert_eq!(outcome.text(), "");
}

#[test]
fn parameter_entities_in_the_internal_subset() {
    let outcome = parse(
        VALID,
        r#"<!DOCTYPE doc [
<!ENTITY % decls "<!ELEMENT item EMPTY>">
<!ELEMENT doc (item*)>
%decls;
]><doc><item/><item/></doc>"#,
    );
    outcome.result.as_ref().unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());

    // but not inside a declaration
    let outcome = parse(
        0,
        r#"<!DOCTYPE doc [
<!ENTITY % content "(item*)">
<!ELEMENT doc %content;>
]><doc/>"#,
    );
    let error = outcome.result.unwrap_err();
    assert_eq!(error.code, XmlParserErrors::XmlErrEntityPEInternal);
}

#[test]
fn entity_declarations_are_reported() {
    let outcome = parse(
        0,
        r#"<!DOCTYPE doc [
<!ENTITY e "text">
<!ENTITY % pe "ignored">
<!ENTITY ext SYSTEM "ext.xml">
<!NOTATION gif PUBLIC "-//GIF//EN">
<!ENTITY pic SYSTEM "pic.gif" NDATA gif>
]><doc/>"#,
    );
    outcome.result.as_ref().unwrap();
    let decls: Vec<String> = outcome
        .trace()
        .into_iter()
        .filter(|line| {
            line.starts_with("SAX.entityDecl")
                || line.starts_with("SAX.unparsedEntityDecl")
                || line.starts_with("SAX.notationDecl")
        })
        .collect();
    assert_eq!(
        decls,
        [
            "SAX.entityDecl(e, 1, NULL, NULL, text)",
            "SAX.entityDecl(ext, 2, NULL, ext.xml, NULL)",
            "SAX.notationDecl(gif, -//GIF//EN, NULL)",
            "SAX.unparsedEntityDecl(pic, NULL, pic.gif, gif)",
        ]
    );
}
