use tracing::debug;

use crate::timeline::Clip;

/// One reversible timeline edit.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoItem {
    /// A single clip was removed; undone by re-inserting it in start order.
    Delete { clip: Clip },
    /// The whole clip list was replaced; undone by restoring `old`.
    ChangeClips { old: Vec<Clip>, new: Vec<Clip> },
}

impl UndoItem {
    /// Short label used in logs and snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delete { .. } => "delete",
            Self::ChangeClips { .. } => "change",
        }
    }
}

/// Stack of reversible edits. Undo pops one item at a time; there is no redo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoLog {
    items: Vec<UndoItem>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: UndoItem) {
        debug!(kind = item.label(), depth = self.items.len() + 1, "undo item pushed");
        self.items.push(item);
    }

    /// Removes and returns the most recent edit.
    pub fn pop(&mut self) -> Option<UndoItem> {
        let item = self.items.pop()?;
        debug!(kind = item.label(), depth = self.items.len(), "undo item popped");
        Some(item)
    }

    pub fn peek(&self) -> Option<&UndoItem> {
        self.items.last()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{UndoItem, UndoLog};
    use crate::timeline::Clip;

    #[test]
    fn pop_returns_items_in_reverse_push_order() {
        let mut log = UndoLog::new();
        log.push(UndoItem::Delete {
            clip: Clip::new(0.0, 1.0),
        });
        log.push(UndoItem::ChangeClips {
            old: vec![],
            new: vec![Clip::new(2.0, 3.0)],
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.peek().map(UndoItem::label), Some("change"));
        assert_eq!(log.pop().map(|item| item.label()), Some("change"));
        assert_eq!(log.pop().map(|item| item.label()), Some("delete"));
        assert!(log.pop().is_none());
        assert!(log.is_empty());
    }
}
