use core::fmt;

/// The operand stack shared by every frame of one execution.
///
/// Frames remember the height they started at and cut the stack back to it
/// when they finish or unwind. The maximum size is only enforced in debug
/// builds to catch runaway pushes during development.
///
/// # Examples
///
/// ```ignore
/// use garnet_core::vm::Stack;
///
/// let mut stack = Stack::new(100);
/// stack.push(42);
/// stack.push(17);
/// assert_eq!(stack.pop(), Some(17));
/// assert_eq!(stack.peek(), Some(&42));
/// assert_eq!(stack.len(), 1);
/// ```
pub struct Stack<T> {
    items: Vec<T>,
    /// Maximum allowed stack size (enforced in debug mode only).
    max_size: usize,
}

impl<T> Stack<T> {
    pub fn new(max_size: usize) -> Self {
        // Pre-allocate a reasonable amount (min of max_size or 256)
        // to avoid frequent reallocations during normal execution
        let initial_capacity = max_size.min(256);

        Self {
            items: Vec::with_capacity(initial_capacity),
            max_size,
        }
    }

    /// Pushes a value onto the stack.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the stack is already at maximum capacity.
    #[inline]
    pub fn push(&mut self, value: T) {
        debug_assert!(
            self.items.len() < self.max_size,
            "Stack overflow: attempted to push beyond maximum size of {}",
            self.max_size
        );
        self.items.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    /// The element `offset` slots below the top (`0` is the top).
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<&T> {
        let len = self.items.len();
        if offset >= len {
            None
        } else {
            Some(&self.items[len - 1 - offset])
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cut the stack back to `len` elements (no-op when already shorter).
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Remove the top `n` elements, returned bottom first.
    ///
    /// Returns `None` (leaving the stack untouched) when fewer than `n`
    /// elements are present.
    pub fn pop_n(&mut self, n: usize) -> Option<Vec<T>> {
        let len = self.items.len();
        if n > len {
            return None;
        }
        Some(self.items.split_off(len - n))
    }

    /// Move the top element below the `depth` elements beneath it.
    ///
    /// Returns `false` (leaving the stack untouched) when the stack is too
    /// short.
    pub fn sink(&mut self, depth: usize) -> bool {
        let len = self.items.len();
        if depth >= len {
            return false;
        }
        self.items[len - 1 - depth..].rotate_right(1);
        true
    }

    /// Exchange the two top elements.
    pub fn swap(&mut self) -> bool {
        let len = self.items.len();
        if len < 2 {
            return false;
        }
        self.items.swap(len - 1, len - 2);
        true
    }

    /// Iterates from bottom to top.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> Stack<T> {
    /// Duplicates the element `offset` slots below the top onto the top.
    ///
    /// Returns `true` if successful, `false` if the offset is out of bounds.
    #[inline]
    pub fn dup_at(&mut self, offset: usize) -> bool {
        if let Some(value) = self.peek_at(offset).cloned() {
            self.push(value);
            true
        } else {
            false
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("items", &self.items)
            .field("len", &self.items.len())
            .field("capacity", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new(10);
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_peek_at() {
        let mut stack = Stack::new(10);
        stack.push(10);
        stack.push(20);
        stack.push(30);
        assert_eq!(stack.peek_at(0), Some(&30));
        assert_eq!(stack.peek_at(2), Some(&10));
        assert_eq!(stack.peek_at(3), None);
    }

    #[test]
    fn test_pop_n_keeps_order() {
        let mut stack = Stack::new(10);
        for i in 1..=4 {
            stack.push(i);
        }
        assert_eq!(stack.pop_n(2), Some(vec![3, 4]));
        assert_eq!(stack.pop_n(3), None);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop_n(0), Some(vec![]));
    }

    #[test]
    fn test_sink() {
        let mut stack = Stack::new(10);
        for i in 1..=4 {
            stack.push(i);
        }
        assert!(stack.sink(2));
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![1, 4, 2, 3]);
        assert!(!stack.sink(4));
    }

    #[test]
    fn test_swap_and_dup() {
        let mut stack = Stack::new(10);
        stack.push(1);
        assert!(!stack.swap());
        stack.push(2);
        assert!(stack.swap());
        assert!(stack.dup_at(1));
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![2, 1, 2]);
        assert!(!stack.dup_at(5));
    }

    #[test]
    fn test_truncate() {
        let mut stack = Stack::new(10);
        stack.push(1);
        stack.push(2);
        stack.truncate(5);
        assert_eq!(stack.len(), 2);
        stack.truncate(0);
        assert!(stack.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Stack overflow")]
    fn test_overflow_debug() {
        let mut stack = Stack::new(1);
        stack.push(1);
        stack.push(2);
    }
}
