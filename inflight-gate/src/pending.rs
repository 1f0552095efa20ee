/// The in-flight entries for one action key, oldest first.
///
/// A plain ordered collection. Identity and removal rules belong to the caller,
/// which removes entries by predicate when they settle.
#[derive(Debug, Clone)]
pub struct PendingSet<E> {
    entries: Vec<E>,
}

impl<E> Default for PendingSet<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> PendingSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` as the newest member of the set.
    pub fn push(&mut self, entry: E) {
        self.entries.push(entry);
    }

    /// Removes and returns the oldest entry matching `predicate`.
    pub fn remove_where<P>(&mut self, predicate: P) -> Option<E>
    where
        P: FnMut(&E) -> bool,
    {
        let index = self.entries.iter().position(predicate)?;
        Some(self.entries.remove(index))
    }

    pub fn oldest(&self) -> Option<&E> {
        self.entries.first()
    }

    pub fn newest(&self) -> Option<&E> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[E] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> IntoIterator for PendingSet<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a PendingSet<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
