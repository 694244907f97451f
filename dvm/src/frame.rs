use crate::function::FunctionIndex;

/// Linkage saved by an interpreted call.
///
/// Frames live on their own stack so value slots stay uniform for the
/// collector; a `CallInfo` never holds a heap reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    /// `None` when the call was made from top-level code.
    pub caller: Option<FunctionIndex>,
    pub caller_address: usize,
    /// Base of the caller's frame.
    pub base: usize,
}

#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<CallInfo>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, frame: CallInfo) {
        self.frames.push(frame);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<CallInfo> {
        self.frames.pop()
    }

    #[inline]
    pub fn top(&self) -> Option<&CallInfo> {
        self.frames.last()
    }

    /// Number of active interpreted calls.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Innermost frame first.
    pub fn iter(&self) -> impl Iterator<Item = &CallInfo> {
        self.frames.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_pop_in_reverse_order() {
        let mut frames = FrameStack::new();
        let outer = CallInfo { caller: None, caller_address: 3, base: 0 };
        let inner = CallInfo {
            caller: Some(FunctionIndex(1)),
            caller_address: 42,
            base: 10,
        };
        frames.push(outer);
        frames.push(inner);

        assert_eq!(frames.depth(), 2);
        assert_eq!(frames.iter().copied().collect::<Vec<_>>(), vec![inner, outer]);
        assert_eq!(frames.pop(), Some(inner));
        assert_eq!(frames.top(), Some(&outer));
        assert_eq!(frames.pop(), Some(outer));
        assert!(frames.pop().is_none());
    }
}
