//! Bounded, ordered slice of a larger ordered collection, with markers for the
//! nearest stored keys just outside it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowAnchor<K> {
    Upper,
    Lower,
    At(K),
}

#[derive(Debug, Clone)]
pub(crate) struct Window<K, E> {
    pub entries: Vec<(K, E)>,
    pub earlier: Option<K>,
    pub later: Option<K>,
    anchor: WindowAnchor<K>,
    count: usize,
}

impl<K: Ord + Copy, E> Window<K, E> {
    /// `below` is ordered downwards from the anchor and `above` upwards from it;
    /// each should hold up to `count + 1` entries.
    pub fn from_parts(
        anchor: WindowAnchor<K>,
        count: usize,
        mut below: Vec<(K, E)>,
        mut above: Vec<(K, E)>,
    ) -> Self {
        let desired_above = match anchor {
            WindowAnchor::Upper => 0,
            WindowAnchor::Lower => count,
            WindowAnchor::At(_) => count - count / 2,
        };
        let mut take_above = above.len().min(desired_above);
        let take_below = below.len().min(count - take_above);
        take_above = above.len().min(count - take_below);

        let earlier = below.get(take_below).map(|(key, _)| *key);
        let later = above.get(take_above).map(|(key, _)| *key);
        below.truncate(take_below);
        above.truncate(take_above);
        below.reverse();
        below.extend(above);
        Self {
            entries: below,
            earlier,
            later,
            anchor,
            count,
        }
    }

    pub fn anchor(&self) -> WindowAnchor<K> {
        self.anchor
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn in_bounds(&self, key: &K) -> bool {
        self.earlier.is_none_or(|earlier| *key > earlier)
            && self.later.is_none_or(|later| *key < later)
    }

    /// Inserts or replaces an entry that falls inside the window's bounds.
    pub fn insert(&mut self, key: K, entry: E) -> bool {
        if !self.in_bounds(&key) {
            return false;
        }
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(position) => self.entries[position] = (key, entry),
            Err(position) => self.entries.insert(position, (key, entry)),
        }
        true
    }

    /// Returns `(removed, stale)`; `stale` means a boundary marker pointed at the
    /// removed key and the window must be rebuilt.
    pub fn remove(&mut self, key: &K) -> (bool, bool) {
        let stale = self.earlier.as_ref() == Some(key) || self.later.as_ref() == Some(key);
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(position) => {
                self.entries.remove(position);
                (true, stale)
            }
            Err(_) => (false, stale),
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut E> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|position| &mut self.entries[position].1)
    }

    /// True when entries exist outside the window that could fill it up again.
    pub fn is_underfilled(&self) -> bool {
        self.entries.len() < self.count && (self.earlier.is_some() || self.later.is_some())
    }

    /// Drops entries on the side away from the anchor until `count` remain.
    pub fn trim(&mut self) {
        while self.entries.len() > self.count {
            let drop_high = match self.anchor {
                WindowAnchor::Upper => false,
                WindowAnchor::Lower => true,
                WindowAnchor::At(anchor) => {
                    let above = self.entries.iter().filter(|(k, _)| *k >= anchor).count();
                    above > self.count - self.count / 2
                }
            };
            if drop_high {
                if let Some((key, _)) = self.entries.pop() {
                    self.later = Some(key);
                }
            } else {
                let (key, _) = self.entries.remove(0);
                self.earlier = Some(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(keys: &[i32]) -> Vec<(i32, ())> {
        keys.iter().map(|k| (*k, ())).collect()
    }

    fn keys(window: &Window<i32, ()>) -> Vec<i32> {
        window.entries.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn upper_window_keeps_newest() {
        let mut window = Window::from_parts(WindowAnchor::Upper, 3, parts(&[9, 8, 7, 6]), vec![]);
        assert_eq!(keys(&window), vec![7, 8, 9]);
        assert_eq!((window.earlier, window.later), (Some(6), None));

        assert!(window.insert(10, ()));
        window.trim();
        assert_eq!(keys(&window), vec![8, 9, 10]);
        assert_eq!(window.earlier, Some(7));
        assert!(!window.insert(5, ()));
    }

    #[test]
    fn anchored_window_splits_around_anchor() {
        let window = Window::from_parts(
            WindowAnchor::At(5),
            4,
            parts(&[4, 3, 2, 1]),
            parts(&[5, 6, 7]),
        );
        assert_eq!(keys(&window), vec![3, 4, 5, 6]);
        assert_eq!((window.earlier, window.later), (Some(2), Some(7)));
    }

    #[test]
    fn removing_marker_marks_stale() {
        let mut window = Window::from_parts(WindowAnchor::Upper, 2, parts(&[3, 2, 1]), vec![]);
        assert_eq!(window.remove(&1), (false, true));
        assert_eq!(window.remove(&3), (true, false));
        assert!(window.is_underfilled());
    }
}
