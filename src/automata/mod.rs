//! Content models of element declarations as finite automata.
//!
//! A declaration is first compiled into an NFA ([`XmlAutomata`]) by a
//! recursive walk over the content particles, then turned into a DFA
//! ([`XmlContentModel`]) by subset construction. The DFA is built once per
//! element type and shared by every instance of that element.

mod dfa;
mod nfa;

use std::rc::Rc;

pub use dfa::{XmlContentModel, XmlContentModelState};
pub use nfa::{XML_AUTOMATA_ACCEPT_STATE, XML_AUTOMATA_INIT_STATE, XmlAutomata, XmlAutomataState};

use crate::{
    dict::{XmlAtom, XmlDict},
    dtd::{XmlElementContent, XmlElementContentOccur, XmlElementTypeVal},
};

/// The input alphabet of content-model automata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XmlSymbol {
    /// A child element, by interned qualified name.
    Name(XmlAtom),
    /// Character data.
    PCData,
    /// The content of an `EMPTY` element.
    Empty,
    Epsilon,
    /// The end of the element content.
    Final,
}

/// Build the NFA of an element declaration.
///
/// Returns `None` for `ANY` and undefined elements, which are not checked.
pub fn build_automata(
    etype: XmlElementTypeVal,
    content: Option<&XmlElementContent>,
    dict: &mut XmlDict,
) -> Option<XmlAutomata> {
    let mut am = XmlAutomata::new();
    let init = am.get_init_state();
    match etype {
        XmlElementTypeVal::XmlElementTypeUndefined | XmlElementTypeVal::XmlElementTypeAny => {
            return None;
        }
        XmlElementTypeVal::XmlElementTypeEmpty => {
            am.new_transition(init, XML_AUTOMATA_ACCEPT_STATE, XmlSymbol::Empty);
        }
        XmlElementTypeVal::XmlElementTypeMixed => {
            let content = content?;
            // `(#PCDATA)` and `(#PCDATA | a)*` both repeat freely.
            let content = content
                .clone()
                .with_occur(XmlElementContentOccur::XmlElementContentMult);
            am.build(dict, &content, init, XML_AUTOMATA_ACCEPT_STATE);
        }
        XmlElementTypeVal::XmlElementTypeElement => {
            am.build(dict, content?, init, XML_AUTOMATA_ACCEPT_STATE);
        }
    }
    am.add_final();
    Some(am)
}

/// Compile the content model of an element declaration.
pub fn compile_content_model(
    etype: XmlElementTypeVal,
    content: Option<&XmlElementContent>,
    dict: &mut XmlDict,
) -> Option<Rc<XmlContentModel>> {
    let am = build_automata(etype, content, dict)?;
    Some(Rc::new(am.compile()))
}
