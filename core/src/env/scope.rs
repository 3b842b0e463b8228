//! Lexical scope records.
//!
//! Scopes live in a [`ScopeArena`] and are addressed by [`ScopeId`]. Every
//! instruction names the scope it runs in; scopes link outward through
//! `outer`, up to the single top scope.

use core::fmt;

use hashbrown::HashMap;

use crate::instructions::BreakPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Top,
    Method,
    Block,
    Class,
    Module,
    /// The parts of an `If` or `Try` region.
    Conditional,
    /// A `While` region.
    Loop,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeKind::Top => "top",
            ScopeKind::Method => "method",
            ScopeKind::Block => "block",
            ScopeKind::Class => "class",
            ScopeKind::Module => "module",
            ScopeKind::Conditional => "conditional",
            ScopeKind::Loop => "loop",
        })
    }
}

/// Storage decision for one local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarSlot {
    /// Position in the owning scope's variable table.
    pub index: u32,
    /// Lives in a heap environment shared with blocks instead of a plain local.
    pub captured: bool,
    /// A declaration (or the first assignment) dominates every use.
    pub declared: bool,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub outer: Option<ScopeId>,
    /// Variables first assigned here belong to the nearest non-hoisting
    /// ancestor.
    pub hoist: bool,
    pub is_lambda: bool,
    /// Index of the instruction opening this scope (None for the top scope).
    pub opener: Option<usize>,
    /// Index of the `End` closing this scope.
    pub closer: Option<usize>,
    pub break_point: Option<BreakPoint>,
    pub return_point: Option<BreakPoint>,
    /// Names first assigned inside this region and declared ahead of it.
    pub hoisted_vars: Vec<String>,
    vars: Vec<(String, VarSlot)>,
    by_name: HashMap<String, usize>,
}

impl Scope {
    pub fn new(kind: ScopeKind, outer: Option<ScopeId>) -> Self {
        Self {
            kind,
            outer,
            hoist: matches!(kind, ScopeKind::Conditional | ScopeKind::Loop),
            is_lambda: false,
            opener: None,
            closer: None,
            break_point: None,
            return_point: None,
            hoisted_vars: Vec::new(),
            vars: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn var(&self, name: &str) -> Option<&VarSlot> {
        self.by_name.get(name).map(|&i| &self.vars[i].1)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut VarSlot> {
        match self.by_name.get(name) {
            Some(&i) => Some(&mut self.vars[i].1),
            None => None,
        }
    }

    /// Find or create the slot for `name`.
    pub fn add_var(&mut self, name: &str) -> &mut VarSlot {
        let position = match self.by_name.get(name) {
            Some(&i) => i,
            None => {
                let i = self.vars.len();
                let slot = VarSlot {
                    index: i as u32,
                    captured: false,
                    declared: false,
                };
                self.vars.push((name.to_string(), slot));
                self.by_name.insert(name.to_string(), i);
                i
            }
        };
        &mut self.vars[position].1
    }

    /// Variables in slot order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &VarSlot)> {
        self.vars.iter().map(|(name, slot)| (name.as_str(), slot))
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Scopes a variable lookup may continue past (closures see outer locals).
    pub fn sees_outer_locals(&self) -> bool {
        self.hoist || self.kind == ScopeKind::Block
    }
}

/// Where a variable lives, as seen from a particular scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub owner: ScopeId,
    pub slot: VarSlot,
    /// Block boundaries crossed between the use and the owner.
    pub depth: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    /// The top scope, created on first use.
    pub fn top(&mut self) -> ScopeId {
        if self.scopes.is_empty() {
            self.push(Scope::new(ScopeKind::Top, None));
        }
        ScopeId(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, scope)| (ScopeId(i as u32), scope))
    }

    /// The scope opened by the instruction at `index`.
    pub fn opened_by(&self, index: usize) -> Option<ScopeId> {
        self.iter()
            .find(|(_, scope)| scope.opener == Some(index))
            .map(|(id, _)| id)
    }

    /// The nearest non-hoisting scope at or above `id`.
    pub fn owner(&self, id: ScopeId) -> ScopeId {
        let mut current = id;
        loop {
            let scope = self.get(current);
            match scope.outer {
                Some(outer) if scope.hoist => current = outer,
                _ => return current,
            }
        }
    }

    /// The outermost hoisting scope between `id` and its owner.
    pub fn outermost_hoisting(&self, id: ScopeId) -> Option<ScopeId> {
        let mut current = id;
        let mut found = None;
        while self.get(current).hoist {
            found = Some(current);
            match self.get(current).outer {
                Some(outer) => current = outer,
                None => break,
            }
        }
        found
    }

    /// Look `name` up from `from`, continuing past hoisting scopes and block
    /// boundaries but stopping at method, class and module bodies.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<Resolution> {
        let mut current = self.owner(from);
        let mut depth = 0;
        loop {
            let scope = self.get(current);
            if let Some(slot) = scope.var(name) {
                return Some(Resolution {
                    owner: current,
                    slot: *slot,
                    depth,
                });
            }
            if scope.kind != ScopeKind::Block {
                return None;
            }
            current = self.owner(scope.outer?);
            depth += 1;
        }
    }

    /// Keep recorded opener/closer indices valid after `count` instructions
    /// were inserted at `at`.
    pub fn shift_indices(&mut self, at: usize, count: usize) {
        for scope in &mut self.scopes {
            if let Some(opener) = scope.opener.as_mut() {
                if *opener >= at {
                    *opener += count;
                }
            }
            if let Some(closer) = scope.closer.as_mut() {
                if *closer >= at {
                    *closer += count;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_walks_through_blocks_only() {
        let mut arena = ScopeArena::new();
        let top = arena.top();
        let method = arena.push(Scope::new(ScopeKind::Method, Some(top)));
        let block = arena.push(Scope::new(ScopeKind::Block, Some(method)));
        let branch = arena.push(Scope::new(ScopeKind::Conditional, Some(block)));

        arena.get_mut(top).add_var("outer");
        arena.get_mut(method).add_var("x");

        let found = arena.resolve(branch, "x").unwrap();
        assert_eq!(found.owner, method);
        assert_eq!(found.depth, 1);

        // Method bodies do not see top-level locals.
        assert_eq!(arena.resolve(branch, "outer"), None);
    }

    #[test]
    fn test_owner_and_outermost_hoisting() {
        let mut arena = ScopeArena::new();
        let top = arena.top();
        let outer_if = arena.push(Scope::new(ScopeKind::Conditional, Some(top)));
        let inner_loop = arena.push(Scope::new(ScopeKind::Loop, Some(outer_if)));

        assert_eq!(arena.owner(inner_loop), top);
        assert_eq!(arena.outermost_hoisting(inner_loop), Some(outer_if));
        assert_eq!(arena.outermost_hoisting(top), None);
    }

    #[test]
    fn test_slots_are_stable() {
        let mut scope = Scope::new(ScopeKind::Top, None);
        assert_eq!(scope.add_var("a").index, 0);
        assert_eq!(scope.add_var("b").index, 1);
        assert_eq!(scope.add_var("a").index, 0);
        scope.var_mut("b").unwrap().captured = true;
        let names: Vec<_> = scope.vars().map(|(n, s)| (n, s.captured)).collect();
        assert_eq!(names, vec![("a", false), ("b", true)]);
    }
}
