/// Element kinds that the rewriter treats as feed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// RSS `<item>`
    Item,
    /// Atom `<entry>`
    Entry,
}

impl EntryKind {
    pub fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"item" => Some(EntryKind::Item),
            b"entry" => Some(EntryKind::Entry),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Item => "item",
            EntryKind::Entry => "entry",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The parts of a feed entry that filters and enclosure injection look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }

    /// Title and description joined, for text classifiers
    pub fn text(&self) -> String {
        let mut text = self.title.clone().unwrap_or_default();
        if let Some(description) = &self.description {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(description);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_from_local_name() {
        assert_eq!(EntryKind::from_local_name(b"item"), Some(EntryKind::Item));
        assert_eq!(EntryKind::from_local_name(b"entry"), Some(EntryKind::Entry));
        assert_eq!(EntryKind::from_local_name(b"channel"), None);
    }

    #[test]
    fn test_entry_text_joins_title_and_description() {
        let entry = Entry::new()
            .with_title(Some("Clip".to_string()))
            .with_description(Some("#shorts".to_string()));
        assert_eq!(entry.text(), "Clip #shorts");

        let untitled = Entry::new().with_description(Some("only body".to_string()));
        assert_eq!(untitled.text(), "only body");
    }
}
