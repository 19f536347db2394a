use serde::{Deserialize, Serialize};

/// Ordered list of trimmed, non-empty names. Order is render order; duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct NameList {
    names: Vec<String>,
}

impl NameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a manually typed name. Blank input is ignored; returns whether a name was added.
    pub fn push_manual(&mut self, input: &str) -> bool {
        let name = input.trim();
        if name.is_empty() {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Appends every non-blank line of an uploaded names file. Returns the number added.
    pub fn append_text(&mut self, content: &str) -> usize {
        let parsed = parse_names(content);
        let added = parsed.len();
        self.names.extend(parsed);
        added
    }

    /// Removes the name at `index`; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<String> {
        if index < self.names.len() {
            Some(self.names.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl FromIterator<String> for NameList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut list = NameList::new();
        for name in iter {
            list.push_manual(&name);
        }
        list
    }
}

impl From<Vec<String>> for NameList {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<NameList> for Vec<String> {
    fn from(list: NameList) -> Self {
        list.names
    }
}

/// Splits file content on line breaks (LF or CRLF), trimming and dropping blank lines.
pub fn parse_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
