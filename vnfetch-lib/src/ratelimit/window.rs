use std::collections::VecDeque;

/// A bounded, insertion-ordered window of elements.
///
/// The oldest element sits at the front. Pushing onto a full window evicts
/// the oldest element, so the window never grows past its capacity.
#[derive(Debug, Clone)]
pub struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create a new window with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an element to the window, removing the oldest if at capacity
    pub fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Drop elements from the front for as long as `expired` holds.
    ///
    /// Because elements are kept in arrival order, this removes every
    /// expired element as long as expiry is monotonic in arrival time.
    pub fn prune(&mut self, mut expired: impl FnMut(&T) -> bool) {
        while self.data.front().is_some_and(&mut expired) {
            self.data.pop_front();
        }
    }

    /// The oldest element, if any
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.data.front()
    }

    /// Get the number of elements currently in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if another push would evict the oldest element
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Maximum number of elements held at once
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get an iterator over the elements in the window, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_capacity() {
        let mut window = Window::new(3);

        // Fill up the window
        window.push(1);
        window.push(2);
        window.push(3);
        assert_eq!(window.len(), 3);
        assert!(window.is_full());

        // Add one more, should remove the oldest
        window.push(4);
        assert_eq!(window.len(), 3);

        let values: Vec<_> = window.iter().copied().collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[test]
    fn test_window_empty() {
        let window: Window<i32> = Window::new(5);
        assert!(window.is_empty());
        assert!(!window.is_full());
        assert_eq!(window.len(), 0);
        assert_eq!(window.front(), None);
    }

    #[test]
    fn test_prune_stops_at_first_live_element() {
        let mut window = Window::new(5);
        for value in [1, 2, 7, 3, 9] {
            window.push(value);
        }

        window.prune(|v| *v < 5);

        let values: Vec<_> = window.iter().copied().collect();
        assert_eq!(values, vec![7, 3, 9]);
        assert_eq!(window.front(), Some(&7));
    }
}
