use super::schema::FileRecord;

/// A user-picked gallery item.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionItem {
    pub filename: String,
    /// Opaque reference back into the UI that rendered the item.
    pub handle: String,
    pub thumbnail_id: String,
    pub file_data: Option<FileRecord>,
}

/// Ordered, filename-keyed selection. Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct SelectionRegistry {
    items: Vec<SelectionItem>,
}

impl SelectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `filename` if absent, deselects it otherwise. Returns whether
    /// the item is selected after the call.
    pub fn toggle(
        &mut self,
        filename: impl Into<String>,
        handle: impl Into<String>,
        thumbnail_id: impl Into<String>,
    ) -> bool {
        let filename = filename.into();
        if let Some(pos) = self.position(&filename) {
            self.items.remove(pos);
            tracing::debug!(filename = %filename, "deselected");
            return false;
        }
        tracing::debug!(filename = %filename, "selected");
        self.items.push(SelectionItem {
            filename,
            handle: handle.into(),
            thumbnail_id: thumbnail_id.into(),
            file_data: None,
        });
        true
    }

    /// Records resolved file data on a selected item. No-op if not selected.
    pub fn attach(&mut self, filename: &str, record: FileRecord) {
        if let Some(pos) = self.position(filename) {
            self.items[pos].file_data = Some(record);
        }
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

    pub fn contains(&self, filename: &str) -> bool {
        self.position(filename).is_some()
    }

    pub fn get(&self, filename: &str) -> Option<&SelectionItem> {
        self.position(filename).map(|pos| &self.items[pos])
    }

    /// Snapshot of the selected filenames in registry order.
    pub fn filenames(&self) -> Vec<String> {
        self.items.iter().map(|i| i.filename.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectionItem> {
        self.items.iter()
    }

    fn position(&self, filename: &str) -> Option<usize> {
        self.items.iter().position(|i| i.filename == filename)
    }
}
