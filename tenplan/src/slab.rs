//! Slab using typed unsigned integer ids to index
//! into vector of T. Pushing new values returns their
//! id. Removing elements is O(log n), does not reallocate
//! and it does not change existing ids. Ids of removed
//! elements are reused by later pushes.

use std::{
    collections::BTreeSet,
    ops::{Index, IndexMut},
};

pub trait SlabId: Copy + Ord + From<usize> + Into<usize> + core::fmt::Debug {}

#[derive(Debug, Clone)]
pub struct Slab<Id: SlabId, T> {
    values: Vec<Option<T>>,
    empty: BTreeSet<Id>,
}

impl<Id: SlabId, T> Slab<Id, T> {
    pub const fn new() -> Self {
        Self { values: Vec::new(), empty: BTreeSet::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len() - self.empty.len()
    }

    pub fn push(&mut self, value: T) -> Id {
        if let Some(id) = self.empty.pop_first() {
            self.values[id.into()] = Some(value);
            id
        } else {
            self.values.push(Some(value));
            Id::from(self.values.len() - 1)
        }
    }

    pub fn remove(&mut self, id: Id) -> Option<T> {
        let value = self.values.get_mut(id.into())?.take()?;
        self.empty.insert(id);
        Some(value)
    }

    pub fn contains_key(&self, id: Id) -> bool {
        matches!(self.values.get(id.into()), Some(Some(_)))
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.values.get(id.into()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.values.get_mut(id.into()).and_then(Option::as_mut)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.values.iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.values.iter().enumerate().filter_map(|(i, x)| x.as_ref().map(|x| (Id::from(i), x)))
    }
}

impl<Id: SlabId, T> Default for Slab<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: SlabId, T> Index<Id> for Slab<Id, T> {
    type Output = T;
    #[track_caller]
    fn index(&self, index: Id) -> &Self::Output {
        self.get(index).unwrap_or_else(|| panic!("{index:?} is not in slab"))
    }
}

impl<Id: SlabId, T> IndexMut<Id> for Slab<Id, T> {
    #[track_caller]
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        self.get_mut(index).unwrap_or_else(|| panic!("{index:?} is not in slab"))
    }
}
