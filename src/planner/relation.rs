//! Base relation identifiers and relation-set bitsets.

use std::fmt;

/// Index of one base join input.
pub type RelationId = usize;

const WORD_BITS: usize = 64;

/// A set of base relations backed by a growable bitset.
///
/// Two sets compare equal when they hold the same relations, regardless of
/// how many trailing zero words either carries.
#[derive(Clone, Default)]
pub struct RelationSet {
    words: Vec<u64>,
}

impl RelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(rel: RelationId) -> Self {
        let mut set = Self::new();
        set.insert(rel);
        set
    }

    /// Set holding every relation in `0..count`.
    pub fn full(count: usize) -> Self {
        (0..count).collect()
    }

    pub fn insert(&mut self, rel: RelationId) {
        let word = rel / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (rel % WORD_BITS);
    }

    pub fn remove(&mut self, rel: RelationId) {
        if let Some(word) = self.words.get_mut(rel / WORD_BITS) {
            *word &= !(1u64 << (rel % WORD_BITS));
        }
    }

    pub fn contains(&self, rel: RelationId) -> bool {
        self.words
            .get(rel / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (rel % WORD_BITS)) != 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// True when the two sets share at least one relation.
    pub fn intersects(&self, other: &RelationSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    pub fn is_subset(&self, other: &RelationSet) -> bool {
        self.words.iter().enumerate().all(|(i, word)| {
            let theirs = other.words.get(i).copied().unwrap_or(0);
            word & !theirs == 0
        })
    }

    pub fn union(&self, other: &RelationSet) -> RelationSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    pub fn union_with(&mut self, other: &RelationSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *mine |= theirs;
        }
    }

    pub fn intersection(&self, other: &RelationSet) -> RelationSet {
        RelationSet {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(a, b)| a & b)
                .collect(),
        }
    }

    pub fn difference(&self, other: &RelationSet) -> RelationSet {
        RelationSet {
            words: self
                .words
                .iter()
                .enumerate()
                .map(|(i, word)| word & !other.words.get(i).copied().unwrap_or(0))
                .collect(),
        }
    }

    /// Relations in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RelationId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, word)| {
            let mut bits = *word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }

    pub fn first(&self) -> Option<RelationId> {
        self.iter().next()
    }

    pub fn to_vec(&self) -> Vec<RelationId> {
        self.iter().collect()
    }

    /// Approximate heap footprint, used for arena budgeting.
    pub(crate) fn heap_bytes(&self) -> usize {
        self.words.capacity() * std::mem::size_of::<u64>()
    }

    fn significant_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map_or(0, |last| last + 1);
        &self.words[..len]
    }
}

impl PartialEq for RelationSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl Eq for RelationSet {}

impl std::hash::Hash for RelationSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl FromIterator<RelationId> for RelationSet {
    fn from_iter<I: IntoIterator<Item = RelationId>>(iter: I) -> Self {
        let mut set = RelationSet::new();
        for rel in iter {
            set.insert(rel);
        }
        set
    }
}

impl fmt::Debug for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, rel) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", rel)?;
        }
        write!(f, "}}")
    }
}
