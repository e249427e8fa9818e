//! Subset construction and the compiled content model.

use std::collections::HashMap;

use crate::dict::XmlAtom;

use super::{XmlAutomata, XmlSymbol};

/// A state of the compiled automaton.
#[derive(Debug, Clone, Default)]
pub struct XmlContentModelState {
    transitions: Vec<(XmlSymbol, usize)>,
}

impl XmlContentModelState {
    pub fn transitions(&self) -> impl Iterator<Item = (&XmlSymbol, usize)> {
        self.transitions.iter().map(|(s, t)| (s, *t))
    }

    fn get(&self, symbol: &XmlSymbol) -> Option<usize> {
        self.transitions
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|&(_, to)| to)
    }
}

/// A deterministic content model, built once per element declaration.
///
/// State 0 is the initial state. An open element keeps its current state and
/// advances it with [`XmlContentModel::step`] on every child.
#[derive(Debug, Clone)]
pub struct XmlContentModel {
    states: Vec<XmlContentModelState>,
    nfa_sets: Vec<Vec<usize>>,
}

impl XmlContentModel {
    pub(crate) fn from_automata(nfa: &XmlAutomata) -> Self {
        let start = nfa.epsilon_closure([nfa.get_init_state()]);
        let mut index: HashMap<Vec<usize>, usize> = HashMap::new();
        index.insert(start.clone(), 0);
        let mut nfa_sets = vec![start];
        let mut states = vec![XmlContentModelState::default()];

        // `nfa_sets` doubles as the work queue.
        let mut next = 0;
        while next < nfa_sets.len() {
            let mut partitions: Vec<(XmlSymbol, Vec<usize>)> = vec![];
            for &state in &nfa_sets[next] {
                let Some(state) = nfa.state(state) else {
                    continue;
                };
                for (symbol, targets) in state.transitions() {
                    if *symbol == XmlSymbol::Epsilon {
                        continue;
                    }
                    match partitions.iter_mut().find(|(s, _)| s == symbol) {
                        Some((_, dest)) => dest.extend_from_slice(targets),
                        None => partitions.push((symbol.clone(), targets.to_vec())),
                    }
                }
            }

            for (symbol, targets) in partitions {
                let set = nfa.epsilon_closure(targets);
                let to = match index.get(&set) {
                    Some(&to) => to,
                    None => {
                        let to = nfa_sets.len();
                        index.insert(set.clone(), to);
                        nfa_sets.push(set);
                        states.push(XmlContentModelState::default());
                        to
                    }
                };
                states[next].transitions.push((symbol, to));
            }
            next += 1;
        }

        log::trace!(
            "content model compiled: {} NFA states, {} DFA states",
            nfa.len(),
            states.len()
        );
        Self { states, nfa_sets }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<&XmlContentModelState> {
        self.states.get(index)
    }

    /// The sorted NFA states each DFA state stands for, indexed like the DFA
    /// states.
    pub fn nfa_state_sets(&self) -> &[Vec<usize>] {
        &self.nfa_sets
    }

    /// Advance from `state` on `symbol`.
    ///
    /// Returns `None` if `symbol` is not allowed there.
    pub fn step(&self, state: usize, symbol: &XmlSymbol) -> Option<usize> {
        self.states.get(state)?.get(symbol)
    }

    /// Check if an element whose content reached `state` may end there.
    ///
    /// An `EMPTY` content model accepts through its `Empty` transition.
    pub fn can_end(&self, state: usize) -> bool {
        if self.step(state, &XmlSymbol::Final).is_some() {
            return true;
        }
        self.step(state, &XmlSymbol::Empty)
            .is_some_and(|next| self.step(next, &XmlSymbol::Final).is_some())
    }

    /// Check if the sequence of child element names is a valid content.
    pub fn accepts(&self, names: &[XmlAtom]) -> bool {
        let mut state = 0;
        for name in names {
            match self.step(state, &XmlSymbol::Name(name.clone())) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.can_end(state)
    }

    /// A human readable list of what may follow in `state`, for diagnostics.
    pub fn expected(&self, state: usize) -> String {
        let Some(state) = self.states.get(state) else {
            return String::new();
        };
        let mut out = vec![];
        for (symbol, _) in &state.transitions {
            match symbol {
                XmlSymbol::Name(name) => out.push(name.to_string()),
                XmlSymbol::PCData => out.push("#PCDATA".to_owned()),
                XmlSymbol::Final => out.push("end of content".to_owned()),
                XmlSymbol::Empty | XmlSymbol::Epsilon => {}
            }
        }
        out.join(" | ")
    }
}
