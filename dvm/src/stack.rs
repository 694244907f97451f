//! Operand and local variable stack shared by every interpreted frame.
//!
//! Slots above `stack_pointer` are physically allocated but dead; the
//! collector only ever looks at `0..stack_pointer`.

use object::{ObjectRef, Value, Visitable};

pub const STACK_ALLOC_SIZE: usize = 4096;

#[derive(Debug)]
pub struct Stack {
    slots: Vec<Value>,
    stack_pointer: usize,
    chunk: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new(STACK_ALLOC_SIZE)
    }
}

impl Stack {
    /// Creates a stack that grows in steps of `chunk` slots.
    pub fn new(chunk: usize) -> Self {
        let chunk = chunk.max(1);
        Self {
            slots: vec![Value::default(); chunk],
            stack_pointer: 0,
            chunk,
        }
    }

    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// Physical capacity in slots.
    #[inline]
    pub fn alloc_size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack_pointer == 0
    }

    /// The live part of the stack, bottom first.
    #[inline]
    pub fn live(&self) -> &[Value] {
        &self.slots[..self.stack_pointer]
    }

    /// Makes sure `need` more slots fit above the stack pointer.
    pub fn reserve(&mut self, need: usize) {
        let required = self.stack_pointer + need;
        if required <= self.slots.len() {
            return;
        }
        let chunks = (required - self.slots.len()).div_ceil(self.chunk);
        let new_size = self.slots.len() + chunks * self.chunk;
        log::debug!("stack grows from {} to {} slots", self.slots.len(), new_size);
        self.slots.resize(new_size, Value::default());
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.reserve(1);
        self.slots[self.stack_pointer] = value;
        self.stack_pointer += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Value> {
        if self.stack_pointer == 0 {
            return None;
        }
        self.stack_pointer -= 1;
        Some(self.slots[self.stack_pointer])
    }

    /// Reads an absolute slot below the stack pointer.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.live().get(index).copied()
    }

    /// Writes an absolute slot below the stack pointer.
    ///
    /// # Panics
    ///
    /// If `index` is not below the stack pointer.
    #[inline]
    pub fn set(&mut self, index: usize, value: Value) {
        assert!(
            index < self.stack_pointer,
            "stack slot {index} above stack pointer {}",
            self.stack_pointer
        );
        self.slots[index] = value;
    }

    /// `peek(0)` is the top of the stack.
    #[inline]
    pub fn peek(&self, n: usize) -> Option<Value> {
        let index = self.stack_pointer.checked_sub(n + 1)?;
        Some(self.slots[index])
    }

    #[inline]
    pub fn set_from_top(&mut self, n: usize, value: Value) {
        let index = self.stack_pointer - (n + 1);
        self.slots[index] = value;
    }

    /// Moves the stack pointer up by `n`, zero filling the new slots.
    pub fn extend(&mut self, n: usize) {
        self.reserve(n);
        let start = self.stack_pointer;
        self.slots[start..start + n].fill(Value::default());
        self.stack_pointer += n;
    }

    /// Moves the stack pointer down by `n`.
    ///
    /// # Panics
    ///
    /// On underflow.
    #[inline]
    pub fn shrink(&mut self, n: usize) {
        assert!(n <= self.stack_pointer, "stack underflow");
        self.stack_pointer -= n;
    }

    #[inline]
    pub fn truncate(&mut self, stack_pointer: usize) {
        debug_assert!(stack_pointer <= self.stack_pointer);
        self.stack_pointer = self.stack_pointer.min(stack_pointer);
    }
}

impl Visitable for Stack {
    fn visit_edges(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.live().visit_edges(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_pairs_restore_stack_pointer() {
        let mut stack = Stack::new(4);
        stack.push(Value::Int(1));
        let before = stack.stack_pointer();

        for n in 0..10 {
            stack.push(Value::Int(n));
        }
        for n in (0..10).rev() {
            assert_eq!(stack.pop(), Some(Value::Int(n)));
        }

        assert_eq!(stack.stack_pointer(), before);
        assert_eq!(stack.pop(), Some(Value::Int(1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn growth_preserves_slots() {
        let mut stack = Stack::new(2);
        let r = ObjectRef::new(1, 0);
        stack.push(Value::Int(7));
        stack.push(Value::from(r));
        assert_eq!(stack.alloc_size(), 2);

        stack.push(Value::Double(0.5));
        assert_eq!(stack.alloc_size(), 4);
        assert_eq!(stack.live(), &[Value::Int(7), Value::from(r), Value::Double(0.5)]);
    }

    #[test]
    fn reserve_rounds_up_to_whole_chunks() {
        let mut stack = Stack::new(STACK_ALLOC_SIZE);
        stack.extend(10);
        stack.reserve(STACK_ALLOC_SIZE + 1);
        assert_eq!(stack.alloc_size(), STACK_ALLOC_SIZE * 2);
        assert_eq!(stack.stack_pointer(), 10);
    }

    #[test]
    fn extend_zero_fills_dead_slots() {
        let mut stack = Stack::new(8);
        stack.push(Value::Int(42));
        stack.pop();
        stack.extend(1);
        assert_eq!(stack.peek(0), Some(Value::Int(0)));
    }

    #[test]
    fn peek_and_set_from_top() {
        let mut stack = Stack::new(8);
        stack.push(Value::Int(1));
        stack.push(Value::Int(2));
        assert_eq!(stack.peek(1), Some(Value::Int(1)));
        assert_eq!(stack.peek(2), None);

        stack.set_from_top(1, Value::Int(9));
        assert_eq!(stack.get(0), Some(Value::Int(9)));
        assert_eq!(stack.get(2), None);
    }

    #[test]
    fn only_live_references_are_roots() {
        let mut stack = Stack::new(8);
        let live = ObjectRef::new(1, 0);
        let dead = ObjectRef::new(2, 0);
        stack.push(Value::from(live));
        stack.push(Value::Int(3));
        stack.push(Value::from(dead));
        stack.shrink(1);

        let mut roots = Vec::new();
        stack.visit_edges(&mut |r| roots.push(r));
        assert_eq!(roots, vec![live]);
    }

    #[test]
    #[should_panic(expected = "stack underflow")]
    fn shrink_past_bottom_panics() {
        let mut stack = Stack::new(8);
        stack.shrink(1);
    }
}
