use std::collections::BTreeSet;

/// In-memory set of banned usernames and IP addresses
#[derive(Debug, Clone, Default)]
pub struct BanList {
    entries: BTreeSet<String>,
}

impl BanList {
    pub fn new(entries: BTreeSet<String>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains(value)
    }

    /// Whether either identifier of a connection is banned
    pub fn is_banned(&self, username: &str, ip: &str) -> bool {
        self.contains(username) || self.contains(ip)
    }

    /// Add a value. Returns false if it was already present.
    pub fn insert(&mut self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        self.entries.insert(value.to_string())
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.entries.clone()
    }
}
