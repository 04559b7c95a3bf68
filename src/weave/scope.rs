//! Scope and label bookkeeping for one method rewrite.
//!
//! A [`ScopeTracker`] answers the questions instrumentation code asks while it edits a
//! body: which local slots are live where the new code goes, which slot is safe to
//! allocate, where a label sits in visit order, whether a label was inserted by the engine,
//! and which source line an inserted label should report.
//!
//! Scopes form a strict tree stored as an arena of [`ScopeNode`]s addressed by
//! [`ScopeId`]; each node records its parent, the labels that opened and closed it and the
//! slots visited directly inside it. The root scope is the method itself.
//!
//! # Line correlation
//!
//! Original labels report the line recorded for them, or else the line of the nearest
//! preceding original label that has one. Inserted labels never carry a line of their own;
//! they take the line of the nearest preceding original label that carries a line entry,
//! or the first line of the body when no such label precedes them.
//!
//! # Example
//!
//! ```rust
//! use classweave::assembly::Label;
//! use classweave::weave::ScopeTracker;
//!
//! let mut tracker = ScopeTracker::new(2);
//! let outer = tracker.open_scope(Label(1));
//! tracker.visit_variable(2);
//! tracker.open_scope(Label(2));
//! tracker.visit_variable(3);
//!
//! assert_eq!(tracker.global_variables().into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
//! assert_eq!(tracker.close_scope(Label(3))?, outer);
//! assert_eq!(tracker.fresh_slot(2), 4);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    assembly::{Label, MethodBody, Node},
    Error, Result,
};

/// Index of a scope in its tracker's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The method-level scope.
    pub const ROOT: ScopeId = ScopeId(0);
}

/// One lexical region of a method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeNode {
    /// Enclosing scope, `None` for the root
    pub parent: Option<ScopeId>,
    /// Label that opened the scope, `None` for the root
    pub opened_at: Option<Label>,
    /// Label that closed the scope, once closed
    pub closed_at: Option<Label>,
    /// Slots visited directly in this scope
    pub slots: BTreeSet<u16>,
}

/// Per-method scope tree, label order and slot allocator.
#[derive(Debug, Clone)]
pub struct ScopeTracker {
    nodes: Vec<ScopeNode>,
    current: ScopeId,
    labels: Vec<Label>,
    positions: HashMap<Label, usize>,
    inserted: HashSet<Label>,
    lines: HashMap<Label, u16>,
    next_slot: u16,
}

impl ScopeTracker {
    /// Create a tracker whose root scope holds the `argument_slots` slots of the receiver
    /// and parameters.
    #[must_use]
    pub fn new(argument_slots: u16) -> Self {
        let root = ScopeNode {
            slots: (0..argument_slots).collect(),
            ..ScopeNode::default()
        };
        ScopeTracker {
            nodes: vec![root],
            current: ScopeId::ROOT,
            labels: Vec::new(),
            positions: HashMap::new(),
            inserted: HashSet::new(),
            lines: HashMap::new(),
            next_slot: argument_slots,
        }
    }

    /// Replay an existing body: every label in order, one scope per local-variable range,
    /// every slot an instruction touches and every line entry.
    ///
    /// Ranges that share bounds share a scope. Scopes still open at the end of the body
    /// are closed so the tracker ends at the root.
    ///
    /// # Errors
    /// Returns [`crate::Error::ScopeMismatch`] if the ranges cannot be replayed as a tree.
    pub fn walk(body: &MethodBody, argument_slots: u16) -> Result<Self> {
        let mut tracker = ScopeTracker::new(argument_slots);
        tracker.next_slot = tracker.next_slot.max(body.max_locals);
        for line in &body.lines {
            tracker.lines.entry(line.start).or_insert(line.line);
        }

        let mut ranges: HashMap<Label, Vec<(Label, Vec<(u16, u16)>)>> = HashMap::new();
        for local in &body.locals {
            let width = if matches!(local.descriptor.as_str(), "J" | "D") { 2 } else { 1 };
            let starting = ranges.entry(local.start).or_default();
            match starting.iter_mut().find(|(end, _)| *end == local.end) {
                Some((_, slots)) => slots.push((local.slot, width)),
                None => starting.push((local.end, vec![(local.slot, width)])),
            }
        }

        let mut open: Vec<Label> = Vec::new();
        for node in &body.nodes {
            match node {
                Node::Label(label) => {
                    tracker.visit_label(*label);
                    while open.last() == Some(label) {
                        open.pop();
                        tracker.close_scope(*label)?;
                    }
                    if let Some(starting) = ranges.remove(label) {
                        // Longest range first so shorter ones nest inside it
                        let mut starting = starting;
                        starting.sort_by_key(|(end, _)| {
                            std::cmp::Reverse(
                                body.nodes
                                    .iter()
                                    .position(|n| *n == Node::Label(*end))
                                    .unwrap_or(usize::MAX),
                            )
                        });
                        for (end, slots) in starting {
                            tracker.open_scope(*label);
                            for (slot, width) in slots {
                                tracker.visit_slots(slot, width);
                            }
                            open.push(end);
                        }
                    }
                }
                Node::Insn(insn) => {
                    if let Some(access) = insn.local_access() {
                        tracker.visit_slots(access.slot, access.width);
                    }
                }
            }
        }

        while let Some(end) = open.pop() {
            tracker.close_scope(end)?;
        }
        Ok(tracker)
    }

    /// Open a child of the current scope at `label` and make it current.
    pub fn open_scope(&mut self, label: Label) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode {
            parent: Some(self.current),
            opened_at: Some(label),
            closed_at: None,
            slots: BTreeSet::new(),
        });
        self.current = id;
        id
    }

    /// Close the current scope at `label` and return its parent, which becomes current.
    ///
    /// # Errors
    /// Returns [`crate::Error::ScopeMismatch`] when only the root scope is open.
    pub fn close_scope(&mut self, label: Label) -> Result<ScopeId> {
        let node = &mut self.nodes[self.current.0];
        let Some(parent) = node.parent else {
            return Err(Error::ScopeMismatch(label.0));
        };
        node.closed_at = Some(label);
        self.current = parent;
        Ok(parent)
    }

    /// Record that `slot` is used in the current scope.
    pub fn visit_variable(&mut self, slot: u16) {
        self.visit_slots(slot, 1);
    }

    fn visit_slots(&mut self, slot: u16, width: u16) {
        self.nodes[self.current.0].slots.insert(slot);
        self.next_slot = self.next_slot.max(slot.saturating_add(width));
    }

    /// Slots visible in the current scope: its own and those of every ancestor.
    #[must_use]
    pub fn global_variables(&self) -> BTreeSet<u16> {
        self.global_variables_of(self.current)
    }

    /// Slots visible in scope `id`.
    #[must_use]
    pub fn global_variables_of(&self, id: ScopeId) -> BTreeSet<u16> {
        let mut slots = BTreeSet::new();
        let mut scope = Some(id);
        while let Some(ScopeId(index)) = scope {
            slots.extend(self.nodes[index].slots.iter().copied());
            scope = self.nodes[index].parent;
        }
        slots
    }

    /// Slots visited directly in the current scope.
    #[must_use]
    pub fn scope_variables(&self) -> BTreeSet<u16> {
        self.nodes[self.current.0].slots.clone()
    }

    /// The current scope.
    #[must_use]
    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    /// The parent of the current scope, `None` at the root.
    #[must_use]
    pub fn enclosing_scope(&self) -> Option<ScopeId> {
        self.nodes[self.current.0].parent
    }

    /// The node of scope `id`.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.nodes.get(id.0)
    }

    /// Number of scopes opened so far, including the root.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.nodes.len()
    }

    /// Record an original label. Revisiting a label keeps its first position.
    pub fn visit_label(&mut self, label: Label) {
        if !self.positions.contains_key(&label) {
            self.positions.insert(label, self.labels.len());
            self.labels.push(label);
        }
    }

    /// Record a label the engine inserted.
    pub fn visit_inserted_label(&mut self, label: Label) {
        self.visit_label(label);
        self.inserted.insert(label);
    }

    /// Zero-based position of `label` among all labels visited so far.
    ///
    /// # Errors
    /// Returns [`crate::Error::LabelNotVisited`] for a label not visited yet.
    pub fn label_index(&self, label: Label) -> Result<usize> {
        self.positions
            .get(&label)
            .copied()
            .ok_or(Error::LabelNotVisited(label.0))
    }

    /// Returns `true` if `label` was recorded with [`ScopeTracker::visit_inserted_label`].
    #[must_use]
    pub fn is_inserted(&self, label: Label) -> bool {
        self.inserted.contains(&label)
    }

    /// Allocate `width` slots past every slot seen so far and record the first of them in
    /// the current scope.
    pub fn fresh_slot(&mut self, width: u16) -> u16 {
        let slot = self.next_slot;
        self.visit_slots(slot, width);
        slot
    }

    /// One past the highest slot in use.
    #[must_use]
    pub fn max_locals(&self) -> u16 {
        self.next_slot
    }

    /// Record the source line of an original label.
    pub fn record_line(&mut self, label: Label, line: u16) {
        self.lines.insert(label, line);
    }

    /// The source line `label` belongs to.
    ///
    /// # Errors
    /// Returns [`crate::Error::LabelNotVisited`] for a label not visited yet.
    pub fn line_for(&self, label: Label) -> Result<Option<u16>> {
        let position = self.label_index(label)?;
        if !self.is_inserted(label) {
            if let Some(line) = self.lines.get(&label) {
                return Ok(Some(*line));
            }
        }
        let preceding = self.labels[..position]
            .iter()
            .rev()
            .filter(|candidate| !self.is_inserted(**candidate))
            .find_map(|candidate| self.lines.get(candidate).copied());
        Ok(preceding.or_else(|| self.first_line()))
    }

    /// The line of the earliest visited original label that carries one.
    #[must_use]
    pub fn first_line(&self) -> Option<u16> {
        self.labels
            .iter()
            .filter(|label| !self.is_inserted(**label))
            .find_map(|label| self.lines.get(label).copied())
    }
}
