//! Least-recently-used ordering of connection indices.
//!
//! Always holds every index exactly once. The front is the connection that
//! has gone longest without a send; the back is the one used last.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UsageOrder {
    order: VecDeque<usize>,
}

impl UsageOrder {
    /// Order `0..count`, in construction order.
    pub fn new(count: usize) -> Self {
        Self {
            order: (0..count).collect(),
        }
    }

    /// Take the least recently used index and mark it most recently used.
    pub fn least_recent(&mut self) -> Option<usize> {
        let index = self.order.pop_front()?;
        self.order.push_back(index);
        Some(index)
    }

    /// Mark `index` most recently used.
    pub fn touch(&mut self, index: usize) {
        if let Some(position) = self.order.iter().position(|&i| i == index) {
            self.order.remove(position);
        }
        self.order.push_back(index);
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(usage: &UsageOrder, count: usize) -> bool {
        let mut seen: Vec<usize> = usage.iter().collect();
        seen.sort_unstable();
        seen == (0..count).collect::<Vec<_>>()
    }

    #[test]
    fn test_round_robin_when_untargeted() {
        let mut usage = UsageOrder::new(3);
        let picks: Vec<_> = (0..6).filter_map(|_| usage.least_recent()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
        assert!(is_permutation(&usage, 3));
    }

    #[test]
    fn test_touch_moves_to_back() {
        let mut usage = UsageOrder::new(3);
        usage.touch(0);
        assert_eq!(usage.iter().collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(usage.least_recent(), Some(1));

        usage.touch(2);
        assert_eq!(usage.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(is_permutation(&usage, 3));
    }

    #[test]
    fn test_touch_last_is_stable() {
        let mut usage = UsageOrder::new(2);
        usage.touch(1);
        usage.touch(1);
        assert_eq!(usage.iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_empty() {
        let mut usage = UsageOrder::new(0);
        assert_eq!(usage.least_recent(), None);
    }
}
