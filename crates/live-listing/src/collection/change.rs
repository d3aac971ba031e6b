//! Change descriptions emitted by a collection.

/// What kind of structural change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
    /// The contents changed too much to describe; observers should re-read everything.
    Reset,
}

/// One structural change: kind, affected items and the index they start at.
#[derive(Debug, Clone)]
pub struct CollectionChange<T> {
    pub kind: ChangeKind,
    /// Items now in the collection (Add, Replace).
    pub new_items: Vec<T>,
    /// Items no longer in the collection (Remove, Replace).
    pub old_items: Vec<T>,
    /// `None` for Reset.
    pub index: Option<usize>,
}

impl<T> CollectionChange<T> {
    pub(crate) fn added(items: Vec<T>, index: usize) -> Self {
        Self {
            kind: ChangeKind::Add,
            new_items: items,
            old_items: Vec::new(),
            index: Some(index),
        }
    }

    pub(crate) fn removed(items: Vec<T>, index: usize) -> Self {
        Self {
            kind: ChangeKind::Remove,
            new_items: Vec::new(),
            old_items: items,
            index: Some(index),
        }
    }

    pub(crate) fn replaced(old_items: Vec<T>, new_items: Vec<T>, index: usize) -> Self {
        Self {
            kind: ChangeKind::Replace,
            new_items,
            old_items,
            index: Some(index),
        }
    }

    pub(crate) fn reset() -> Self {
        Self {
            kind: ChangeKind::Reset,
            new_items: Vec::new(),
            old_items: Vec::new(),
            index: None,
        }
    }
}
