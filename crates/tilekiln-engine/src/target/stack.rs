use crate::ids::TargetId;

/// Fixed-capacity LIFO of activated render targets.
///
/// Entries live in a preallocated array indexed by depth; index 0 is an
/// empty sentinel so `current` on an empty stack needs no special case.
/// Nothing is allocated after construction.
#[derive(Debug, Clone)]
pub struct ActivationStack {
    entries: Vec<Option<TargetId>>,
    top: usize,
}

impl ActivationStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: vec![None; capacity + 1], top: 0 }
    }

    /// Maximum number of nested activations.
    pub fn capacity(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn depth(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Target on top of the stack.
    pub fn current(&self) -> Option<TargetId> {
        self.entries[self.top]
    }

    /// Pushes a target.
    ///
    /// # Panics
    /// When the stack is full. Nesting deeper than the configured capacity
    /// means activations are not being balanced.
    pub fn push(&mut self, id: TargetId) {
        assert!(
            self.top < self.capacity(),
            "activation stack overflow: capacity {} exceeded",
            self.capacity()
        );
        self.top += 1;
        self.entries[self.top] = Some(id);
    }

    /// Removes the top target and returns it.
    pub fn pop(&mut self) -> Option<TargetId> {
        if self.top == 0 {
            return None;
        }
        let popped = self.entries[self.top].take();
        self.top -= 1;
        popped
    }

    /// Removes the top target and returns the one below it, which becomes current.
    pub fn pop_prev(&mut self) -> Option<TargetId> {
        self.pop();
        self.current()
    }

    /// Swaps every occurrence of `old` for `new`, e.g. after a target is re-created.
    pub fn replace(&mut self, old: TargetId, new: TargetId) {
        for entry in &mut self.entries[1..=self.top] {
            if *entry == Some(old) {
                *entry = Some(new);
            }
        }
    }

    pub fn reset(&mut self) {
        for entry in &mut self.entries[1..=self.top] {
            *entry = None;
        }
        self.top = 0;
    }

    /// Targets from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.entries[1..=self.top].iter().flatten().copied()
    }
}
