mod common;

use common::parse;
use exml_reader::{
    XmlErrorKind,
    dtd::XmlDtdState,
    error::XmlParserErrors,
    parser::{XmlEvent, XmlParserOption, XmlReader},
};

const VALID: i32 = XmlParserOption::XmlParseDTDValid as i32;

const DTD: &str = r#"<!DOCTYPE doc [
<!ELEMENT doc (head, item*)>
<!ELEMENT head (#PCDATA)>
<!ELEMENT item EMPTY>
<!ATTLIST item id ID #REQUIRED ref IDREF #IMPLIED kind (a|b) "a">
]>
"#;

fn validate(body: &str) -> common::Outcome {
    parse(VALID, &format!("{DTD}{body}"))
}

fn codes(outcome: &common::Outcome) -> Vec<XmlParserErrors> {
    outcome.errors.errors().iter().map(|e| e.code).collect()
}

#[test]
fn valid_document() {
    let outcome = validate(
        r#"<doc><head>title</head><item id="i1"/><item id="i2" ref="i1" kind="b"/></doc>"#,
    );
    outcome.result.as_ref().unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());
}

#[test]
fn defaulted_attributes_are_not_specified() {
    let outcome = validate(r#"<doc><head/><item id="i1"/></doc>"#);
    let attributes = outcome
        .events
        .iter()
        .find_map(|e| match e {
            XmlEvent::StartElement { name, attributes } if name.local_name() == "item" => {
                Some(attributes.clone())
            }
            _ => None,
        })
        .unwrap();
    let kind = attributes
        .iter()
        .find(|a| a.name.local_name() == "kind")
        .unwrap();
    assert_eq!(&*kind.value, "a");
    assert!(!kind.specified);
    assert!(attributes.iter().find(|a| a.name.local_name() == "id").unwrap().specified);
}

#[test]
fn content_model_violation_is_reported_once() {
    let outcome = validate(r#"<doc><item id="i1"/><head>t</head><item id="i2"/></doc>"#);
    outcome.result.as_ref().unwrap();
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDContentModel]);
    let error = &outcome.errors.errors()[0];
    assert_eq!(error.kind(), XmlErrorKind::Validity);
    let message = error.message.as_deref().unwrap();
    assert!(message.contains("expecting head"), "{message}");
    assert!(message.contains("got item"), "{message}");
}

#[test]
fn incomplete_content_is_reported_at_the_end_tag() {
    let outcome = validate("<doc></doc>");
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDContentModel]);
    let message = outcome.errors.errors()[0].message.clone().unwrap();
    assert!(message.contains("got end of content"), "{message}");
}

#[test]
fn ids_and_references() {
    let outcome = validate(r#"<doc><head/><item id="x"/><item id="x"/></doc>"#);
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDIDRedefined]);

    let outcome = validate(r#"<doc><head/><item id="x" ref="nowhere"/></doc>"#);
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDUnknownID]);

    // forward references are resolved at the end of the document
    let outcome = validate(r#"<doc><head/><item id="x" ref="y"/><item id="y"/></doc>"#);
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());
}

#[test]
fn attribute_checks() {
    let outcome = validate(r#"<doc><head/><item/></doc>"#);
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDMissingAttribute]);

    let outcome = validate(r#"<doc><head/><item id="x" kind="c"/></doc>"#);
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDAttributeValue]);

    let outcome = validate(r#"<doc><head/><item id="x" color="red"/></doc>"#);
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDUnknownAttribute]);
}

#[test]
fn empty_element_with_content() {
    let outcome = validate(r#"<doc><head/><item id="x">text<b/></item></doc>"#);
    let found = codes(&outcome);
    assert_eq!(found[0], XmlParserErrors::XmlDTDNotEmpty);
    assert_eq!(
        found
            .iter()
            .filter(|&&code| code == XmlParserErrors::XmlDTDNotEmpty)
            .count(),
        1
    );
}

#[test]
fn root_name_must_match() {
    let outcome = parse(
        VALID,
        "<!DOCTYPE other [<!ELEMENT doc EMPTY>]><doc/>",
    );
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDRootName]);
}

#[test]
fn mixed_content_is_any_order() {
    let dtd = "<!DOCTYPE p [<!ELEMENT p (#PCDATA|em|b)*><!ELEMENT em (#PCDATA)><!ELEMENT b EMPTY><!ELEMENT i EMPTY>]>";
    let outcome = parse(VALID, &format!("{dtd}<p>x<b/>y<em>z</em><b/></p>"));
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());

    let outcome = parse(VALID, &format!("{dtd}<p>x<i/></p>"));
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDContentModel]);
}

#[test]
fn whitespace_in_element_content_is_ignorable() {
    let outcome = validate("<doc>\n  <head>a b</head>\n  <item id=\"x\"/>\n</doc>");
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors.errors());
    let ignorable = outcome
        .events
        .iter()
        .filter(|e| matches!(e, XmlEvent::IgnorableWhitespace(_)))
        .count();
    assert_eq!(ignorable, 3);
    assert_eq!(outcome.text(), "a b");

    // without validation the same whitespace is character data
    let outcome = parse(0, &format!("{DTD}<doc>\n  <head/>\n</doc>"));
    assert!(
        outcome
            .events
            .iter()
            .all(|e| !matches!(e, XmlEvent::IgnorableWhitespace(_)))
    );
    assert_eq!(outcome.text(), "\n  \n");
}

#[test]
fn undeclared_notation() {
    let outcome = parse(
        VALID,
        "<!DOCTYPE doc [<!ELEMENT doc EMPTY><!ATTLIST doc fmt NOTATION (gif) #IMPLIED>]><doc/>",
    );
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDUnknownNotation]);
}

#[test]
fn no_dtd_is_reported_once() {
    let outcome = parse(VALID, "<doc><a/><b/></doc>");
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDNoDTD]);
}

#[test]
fn invalid_documents_are_accepted_without_validation() {
    let outcome = parse(0, &format!("{DTD}<doc><item/></doc>"));
    outcome.result.as_ref().unwrap();
    assert!(outcome.errors.is_empty());
}

#[test]
fn validity_error_without_handler_stops_the_parse() {
    let mut reader = XmlReader::with_options(VALID);
    let err = reader
        .parse_bytes(None, format!("{DTD}<doc><item id='x'/></doc>").as_bytes())
        .unwrap_err();
    assert_eq!(err.code, XmlParserErrors::XmlDTDContentModel);
    assert_eq!(reader.diagnostics().nb_errors(), 1);
}

#[test]
fn declaration_checks() {
    let outcome = parse(VALID, "<!DOCTYPE a [<!ELEMENT a EMPTY><!ELEMENT a ANY>]><a/>");
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDElemRedefined]);

    // a second declaration of an attribute is only a warning
    let outcome = parse(
        VALID,
        r#"<!DOCTYPE a [<!ELEMENT a EMPTY><!ATTLIST a x CDATA #IMPLIED><!ATTLIST a x CDATA "d">]><a/>"#,
    );
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDAttributeRedefined]);
    assert_eq!(outcome.errors.errors()[0].kind(), XmlErrorKind::ValidityWarning);

    let outcome = parse(
        VALID,
        "<!DOCTYPE a [<!ELEMENT a EMPTY><!ATTLIST ghost x CDATA #IMPLIED>]><a/>",
    );
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDUnknownElem]);
    assert_eq!(outcome.errors.errors()[0].kind(), XmlErrorKind::ValidityWarning);

    let outcome = parse(
        VALID,
        r#"<!DOCTYPE a [<!ELEMENT a (#PCDATA)><!ATTLIST a xml:space CDATA #IMPLIED>]><a xml:space="preserve"> </a>"#,
    );
    assert_eq!(codes(&outcome), [XmlParserErrors::XmlDTDAttributeValue]);
}

#[test]
fn dtd_state_follows_the_document() {
    let mut reader = XmlReader::new();
    reader.parse_bytes(None, b"<doc/>").unwrap();
    assert_eq!(reader.dtd_state(), XmlDtdState::NoDTD);

    let mut reader = XmlReader::new();
    reader
        .parse_bytes(None, b"<!DOCTYPE doc [<!ELEMENT doc EMPTY>]><doc/>")
        .unwrap();
    assert_eq!(reader.dtd_state(), XmlDtdState::Validated);
}
