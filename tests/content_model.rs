mod common;

use common::parse;
use exml_reader::{
    XmlAtom, XmlDict,
    automata::{build_automata, compile_content_model},
    dtd::{XmlElementContent, XmlElementContentOccur, XmlElementTypeVal},
    error::XmlParserErrors,
    parser::{XmlEvent, XmlParserOption},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const NAMES: [&str; 3] = ["a", "b", "c"];

fn random_occur(rng: &mut StdRng) -> XmlElementContentOccur {
    match rng.random_range(0..4) {
        0 => XmlElementContentOccur::XmlElementContentOnce,
        1 => XmlElementContentOccur::XmlElementContentOpt,
        2 => XmlElementContentOccur::XmlElementContentMult,
        _ => XmlElementContentOccur::XmlElementContentPlus,
    }
}

fn random_particle(rng: &mut StdRng, depth: usize) -> XmlElementContent {
    let particle = if depth == 0 || rng.random_range(0..3) == 0 {
        XmlElementContent::element(NAMES[rng.random_range(0..NAMES.len())])
    } else {
        let children = (0..rng.random_range(1..4))
            .map(|_| random_particle(rng, depth - 1))
            .collect();
        if rng.random_bool(0.5) {
            XmlElementContent::seq(children)
        } else {
            XmlElementContent::or(children)
        }
    };
    particle.with_occur(random_occur(rng))
}

#[test]
fn dfa_agrees_with_nfa() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut dict = XmlDict::new();
    let atoms: Vec<XmlAtom> = NAMES.iter().map(|name| dict.intern(name)).collect();
    for _ in 0..200 {
        let content = random_particle(&mut rng, 3);
        let nfa = build_automata(
            XmlElementTypeVal::XmlElementTypeElement,
            Some(&content),
            &mut dict,
        )
        .unwrap();
        let dfa = nfa.compile();
        for _ in 0..50 {
            let input: Vec<XmlAtom> = (0..rng.random_range(0..7))
                .map(|_| atoms[rng.random_range(0..atoms.len())].clone())
                .collect();
            assert_eq!(
                nfa.accepts(&input),
                dfa.accepts(&input),
                "{content} on {:?}",
                input.iter().map(|a| a.as_str()).collect::<Vec<_>>()
            );
        }
    }
}

#[test]
fn ambiguous_models_are_accepted() {
    let mut dict = XmlDict::new();
    // (a, b) | (a, c) is not deterministic, the DFA does not mind
    let content = XmlElementContent::or(vec![
        XmlElementContent::seq(vec![
            XmlElementContent::element("a"),
            XmlElementContent::element("b"),
        ]),
        XmlElementContent::seq(vec![
            XmlElementContent::element("a"),
            XmlElementContent::element("c"),
        ]),
    ]);
    let model = compile_content_model(
        XmlElementTypeVal::XmlElementTypeElement,
        Some(&content),
        &mut dict,
    )
    .unwrap();
    let names = |list: &[&str], dict: &mut XmlDict| {
        list.iter().map(|n| dict.intern(n)).collect::<Vec<_>>()
    };
    assert!(model.accepts(&names(&["a", "b"], &mut dict)));
    assert!(model.accepts(&names(&["a", "c"], &mut dict)));
    assert!(!model.accepts(&names(&["a"], &mut dict)));
    assert!(!model.accepts(&names(&["a", "b", "c"], &mut dict)));
}

#[test]
fn declarations_are_reported_with_their_model() {
    let outcome = parse(
        0,
        "<!DOCTYPE doc [<!ELEMENT doc (a, b?, (c|d)*)><!ELEMENT a EMPTY><!ELEMENT b ANY><!ELEMENT c (#PCDATA|a)*>]><doc><a/></doc>",
    );
    outcome.result.as_ref().unwrap();
    let decls: Vec<String> = outcome
        .events
        .iter()
        .filter(|e| matches!(e, XmlEvent::ElementDecl { .. }))
        .map(|e| e.to_string())
        .collect();
    assert_eq!(
        decls,
        [
            "SAX.elementDecl(doc, (a , b? , (c | d)*))",
            "SAX.elementDecl(a, EMPTY)",
            "SAX.elementDecl(b, ANY)",
            "SAX.elementDecl(c, (#PCDATA | a)*)",
        ]
    );
}

#[test]
fn models_are_shared_by_instances() {
    // every <item> is checked against the same compiled model
    let doc = "<!DOCTYPE list [<!ELEMENT list (item+)><!ELEMENT item (k, v?)><!ELEMENT k (#PCDATA)><!ELEMENT v (#PCDATA)>]>\
               <list><item><k>1</k><v>x</v></item><item><k>2</k></item><item><v>y</v></item></list>";
    let outcome = parse(XmlParserOption::XmlParseDTDValid as i32, doc);
    let errors = outcome.errors.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].code, XmlParserErrors::XmlDTDContentModel);
    assert!(errors[0].message.as_deref().unwrap().contains("Element item"));
}
