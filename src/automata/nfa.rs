//! Thompson-style construction of content-model automata.

use std::collections::HashSet;

use crate::{
    dict::{XmlAtom, XmlDict},
    dtd::{XmlElementContent, XmlElementContentOccur, XmlElementContentType},
};

use super::{XmlContentModel, XmlSymbol};

/// The initial state of every [`XmlAutomata`].
pub const XML_AUTOMATA_INIT_STATE: usize = 0;
/// The nominal accepting state, before the final symbol is added.
pub const XML_AUTOMATA_ACCEPT_STATE: usize = 1;

/// A state of a nondeterministic automaton.
///
/// Transitions keep the order in which they were added. One symbol maps to
/// every destination it leads to.
#[derive(Debug, Clone, Default)]
pub struct XmlAutomataState {
    pub(crate) transitions: Vec<(XmlSymbol, Vec<usize>)>,
}

impl XmlAutomataState {
    fn add(&mut self, symbol: XmlSymbol, to: usize) {
        if let Some((_, targets)) = self.transitions.iter_mut().find(|(s, _)| *s == symbol) {
            if !targets.contains(&to) {
                targets.push(to);
            }
        } else {
            self.transitions.push((symbol, vec![to]));
        }
    }

    pub fn transitions(&self) -> impl Iterator<Item = (&XmlSymbol, &[usize])> {
        self.transitions.iter().map(|(s, t)| (s, t.as_slice()))
    }
}

/// A content-model NFA.
///
/// State [`XML_AUTOMATA_INIT_STATE`] is the initial state and
/// [`XML_AUTOMATA_ACCEPT_STATE`] the accepting one.
#[derive(Debug, Clone)]
pub struct XmlAutomata {
    states: Vec<XmlAutomataState>,
    final_state: Option<usize>,
}

impl Default for XmlAutomata {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlAutomata {
    pub fn new() -> Self {
        Self {
            states: vec![XmlAutomataState::default(), XmlAutomataState::default()],
            final_state: None,
        }
    }

    #[doc(alias = "xmlAutomataGetInitState")]
    pub fn get_init_state(&self) -> usize {
        XML_AUTOMATA_INIT_STATE
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<&XmlAutomataState> {
        self.states.get(index)
    }

    /// Create a new disconnected state.
    #[doc(alias = "xmlAutomataNewState")]
    pub fn new_state(&mut self) -> usize {
        self.states.push(XmlAutomataState::default());
        self.states.len() - 1
    }

    #[doc(alias = "xmlAutomataNewTransition")]
    pub fn new_transition(&mut self, from: usize, to: usize, symbol: XmlSymbol) {
        self.states[from].add(symbol, to);
    }

    #[doc(alias = "xmlAutomataNewEpsilon")]
    pub fn new_epsilon(&mut self, from: usize, to: usize) {
        self.new_transition(from, to, XmlSymbol::Epsilon);
    }

    /// Compile `particle` between `entry` and `exit`.
    pub fn build(
        &mut self,
        dict: &mut XmlDict,
        particle: &XmlElementContent,
        entry: usize,
        exit: usize,
    ) {
        match particle.ocur {
            XmlElementContentOccur::XmlElementContentOnce => {
                self.build_base(dict, particle, entry, exit)
            }
            XmlElementContentOccur::XmlElementContentOpt => {
                self.build_base(dict, particle, entry, exit);
                self.new_epsilon(entry, exit);
            }
            ocur => {
                let s1 = self.new_state();
                let s2 = self.new_state();
                self.new_epsilon(entry, s1);
                self.build_base(dict, particle, s1, s2);
                self.new_epsilon(s2, s1);
                self.new_epsilon(s2, exit);
                if ocur == XmlElementContentOccur::XmlElementContentMult {
                    self.new_epsilon(entry, exit);
                }
            }
        }
    }

    fn build_base(
        &mut self,
        dict: &mut XmlDict,
        particle: &XmlElementContent,
        entry: usize,
        exit: usize,
    ) {
        match &particle.typ {
            XmlElementContentType::XmlElementContentPCDATA => {
                self.new_transition(entry, exit, XmlSymbol::PCData);
            }
            XmlElementContentType::XmlElementContentElement(name) => {
                let name = dict.intern(name);
                self.new_transition(entry, exit, XmlSymbol::Name(name));
            }
            XmlElementContentType::XmlElementContentSeq(children) => {
                if children.is_empty() {
                    self.new_epsilon(entry, exit);
                    return;
                }
                let mut from = entry;
                for (i, child) in children.iter().enumerate() {
                    let to = if i + 1 == children.len() {
                        exit
                    } else {
                        self.new_state()
                    };
                    self.build(dict, child, from, to);
                    from = to;
                }
            }
            XmlElementContentType::XmlElementContentOr(children) => {
                for child in children {
                    self.build(dict, child, entry, exit);
                }
            }
        }
    }

    /// Append the synthetic final state, reachable from the accepting state
    /// through [`XmlSymbol::Final`].
    ///
    /// Returns the index of the final state.
    pub fn add_final(&mut self) -> usize {
        if let Some(state) = self.final_state {
            return state;
        }
        let state = self.new_state();
        self.new_transition(XML_AUTOMATA_ACCEPT_STATE, state, XmlSymbol::Final);
        self.final_state = Some(state);
        state
    }

    pub fn final_state(&self) -> Option<usize> {
        self.final_state
    }

    /// The states reachable from `states` through epsilon transitions only,
    /// sorted and without duplicates.
    pub fn epsilon_closure(&self, states: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut stack: Vec<usize> = states.into_iter().collect();
        while let Some(state) = stack.pop() {
            if !seen.insert(state) {
                continue;
            }
            for (symbol, targets) in &self.states[state].transitions {
                if *symbol == XmlSymbol::Epsilon {
                    stack.extend(targets.iter().copied().filter(|t| !seen.contains(t)));
                }
            }
        }
        let mut closure: Vec<usize> = seen.into_iter().collect();
        closure.sort_unstable();
        closure
    }

    /// The closure of the states reached from `states` on `symbol`.
    pub fn step(&self, states: &[usize], symbol: &XmlSymbol) -> Vec<usize> {
        let targets = states.iter().flat_map(|&state| {
            self.states[state]
                .transitions
                .iter()
                .filter(move |(s, _)| s == symbol)
                .flat_map(|(_, t)| t.iter().copied())
        });
        self.epsilon_closure(targets.collect::<Vec<_>>())
    }

    /// Simulate the automaton on `names` and check that the end of input is
    /// a valid place to stop.
    pub fn accepts(&self, names: &[XmlAtom]) -> bool {
        let mut current = self.epsilon_closure([XML_AUTOMATA_INIT_STATE]);
        for name in names {
            current = self.step(&current, &XmlSymbol::Name(name.clone()));
            if current.is_empty() {
                return false;
            }
        }
        if current.contains(&XML_AUTOMATA_ACCEPT_STATE) {
            return true;
        }
        let after_empty = self.step(&current, &XmlSymbol::Empty);
        after_empty.contains(&XML_AUTOMATA_ACCEPT_STATE)
    }

    /// Run the subset construction.
    #[doc(alias = "xmlAutomataCompile")]
    pub fn compile(&self) -> XmlContentModel {
        XmlContentModel::from_automata(self)
    }
}
