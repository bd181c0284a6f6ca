use super::Grammar;
use crate::GrammarError;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Owner of all loaded grammars.
///
/// The container maintains both directions of the inheritance graph:
/// `base_of[g]` holds the grammars `g` inherits from and `derived_of[g]` the
/// grammars inheriting `g`. The two maps are mutual transposes; cycle detection
/// runs on every insertion and a grammar closing a cycle is not installed.
#[derive(Default)]
pub struct GrammarContainer {
    grammars: IndexMap<String, Rc<Grammar>>,
    base_of: HashMap<String, Vec<String>>,
    derived_of: HashMap<String, Vec<String>>,
}

impl GrammarContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a grammar, replacing any previous grammar of the same name.
    /// Fails with [GrammarError::CircularInheritance] when the insertion would
    /// close an inheritance cycle; the container is left unchanged in that case.
    pub fn insert(&mut self, grammar: Grammar) -> Result<(), GrammarError> {
        if let Some(cycle) = self.find_cycle(&grammar) {
            return Err(GrammarError::CircularInheritance {
                grammar: grammar.name.clone(),
                cycle,
            });
        }

        let name = grammar.name.clone();
        if self.grammars.contains_key(&name) {
            self.unlink(&name);
        }
        self.base_of.insert(name.clone(), grammar.base_grammars.clone());
        for base in &grammar.base_grammars {
            self.derived_of
                .entry(base.clone())
                .or_default()
                .push(name.clone());
        }
        self.grammars.insert(name, Rc::new(grammar));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Grammar>> {
        self.grammars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.grammars.contains_key(name)
    }

    /// Mutate a grammar in place through `apply`, bumping its version.
    /// Returns false when the grammar is unknown.
    pub fn update<F: FnOnce(&mut Grammar)>(&mut self, name: &str, apply: F) -> bool {
        match self.grammars.get_mut(name) {
            Some(grammar) => {
                let grammar = Rc::make_mut(grammar);
                apply(grammar);
                grammar.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<Grammar>> {
        self.unlink(name);
        self.grammars.shift_remove(name)
    }

    pub fn clear(&mut self) {
        self.grammars.clear();
        self.base_of.clear();
        self.derived_of.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.grammars.keys()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Direct bases of `name`, in declaration order.
    pub fn bases_of(&self, name: &str) -> &[String] {
        self.base_of.get(name).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Grammars directly inheriting `name`.
    pub fn derived_of(&self, name: &str) -> &[String] {
        self.derived_of.get(name).map(|v| &v[..]).unwrap_or(&[])
    }

    /// Every grammar transitively inheriting `name`, in breadth-first order.
    pub fn transitive_derivatives(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: Vec<&str> = vec![name];
        while let Some(current) = queue.pop() {
            for derived in self.derived_of(current) {
                if seen.insert(derived.clone()) {
                    out.push(derived.clone());
                    queue.push(derived);
                }
            }
        }
        out
    }

    /// Order `names` so that every grammar appears after its bases. Names whose
    /// bases cannot be satisfied within the set (or which form a cycle) are
    /// reported as errors; satisfiable names are still returned in order.
    pub fn dependency_order(
        grammars: &[Grammar],
    ) -> (Vec<usize>, Vec<GrammarError>) {
        let by_name: HashMap<&str, usize> = grammars
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.as_str(), i))
            .collect();

        let mut ordered = Vec::new();
        let mut state: HashMap<usize, u8> = HashMap::new(); // 1 = on stack, 2 = done
        let mut errors = Vec::new();

        fn visit(
            index: usize,
            grammars: &[Grammar],
            by_name: &HashMap<&str, usize>,
            state: &mut HashMap<usize, u8>,
            ordered: &mut Vec<usize>,
            stack: &mut Vec<String>,
            errors: &mut Vec<GrammarError>,
        ) -> bool {
            match state.get(&index) {
                Some(2) => return true,
                Some(1) => {
                    let name = grammars[index].name.clone();
                    let mut cycle: Vec<String> = stack
                        .iter()
                        .skip_while(|n| **n != name)
                        .cloned()
                        .collect();
                    cycle.push(name.clone());
                    errors.push(GrammarError::CircularInheritance { grammar: name, cycle });
                    return false;
                }
                _ => {}
            }
            state.insert(index, 1);
            stack.push(grammars[index].name.clone());
            let mut ok = true;
            for base in &grammars[index].base_grammars {
                match by_name.get(base.as_str()) {
                    Some(&b) => {
                        if !visit(b, grammars, by_name, state, ordered, stack, errors) {
                            ok = false;
                        }
                    }
                    None => {
                        errors.push(GrammarError::MissingGrammar {
                            grammar: grammars[index].name.clone(),
                            missing: base.clone(),
                        });
                        ok = false;
                    }
                }
            }
            stack.pop();
            state.insert(index, 2);
            if ok {
                ordered.push(index);
            }
            ok
        }

        let mut stack = Vec::new();
        for index in 0..grammars.len() {
            visit(
                index,
                grammars,
                &by_name,
                &mut state,
                &mut ordered,
                &mut stack,
                &mut errors,
            );
        }
        (ordered, errors)
    }

    fn unlink(&mut self, name: &str) {
        if let Some(bases) = self.base_of.remove(name) {
            for base in bases {
                if let Some(deriveds) = self.derived_of.get_mut(&base) {
                    deriveds.retain(|d| d != name);
                }
            }
        }
    }

    fn bases_with_candidate<'a>(&'a self, candidate: &'a Grammar, name: &str) -> &'a [String] {
        if name == candidate.name {
            &candidate.base_grammars
        } else {
            self.bases_of(name)
        }
    }

    /// Walk the base graph as it would look with `candidate` installed and
    /// return the first cycle found, in walk order.
    fn find_cycle(&self, candidate: &Grammar) -> Option<Vec<String>> {
        let mut stack: Vec<String> = vec![candidate.name.clone()];
        let mut on_stack: HashSet<String> = stack.iter().cloned().collect();
        self.cycle_dfs(candidate, candidate.name.as_str(), &mut stack, &mut on_stack)
    }

    fn cycle_dfs(
        &self,
        candidate: &Grammar,
        current: &str,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        for base in self.bases_with_candidate(candidate, current) {
            if on_stack.contains(base) {
                let mut cycle: Vec<String> =
                    stack.iter().skip_while(|n| *n != base).cloned().collect();
                cycle.push(base.clone());
                return Some(cycle);
            }
            stack.push(base.clone());
            on_stack.insert(base.clone());
            if let Some(cycle) = self.cycle_dfs(candidate, base, stack, on_stack) {
                return Some(cycle);
            }
            on_stack.remove(base.as_str());
            stack.pop();
        }
        None
    }
}
