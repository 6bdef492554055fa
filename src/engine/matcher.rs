use rustc_hash::FxHashSet;

/// Hashed domain set with one-directional suffix matching: a listed domain
/// covers itself and every subdomain, never the reverse.
#[derive(Debug, Default)]
pub struct DomainSet {
    domains: FxHashSet<Box<str>>,
}

impl DomainSet {
    /// Builds the set from stored entries, normalizing each and dropping
    /// anything that cannot name a host.
    pub fn from_entries(entries: impl IntoIterator<Item = String>) -> Self {
        let mut domains = FxHashSet::default();
        for entry in entries {
            if let Some(host) = crate::domain::normalize(&entry) {
                domains.insert(host.into_boxed_str());
            }
        }
        Self { domains }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Exact match first, then iterative suffix matching, so a lookup costs
    /// O(labels) instead of O(list).
    pub fn matches(&self, host: &str) -> bool {
        let mut part = host;
        loop {
            if self.domains.contains(part) {
                return true;
            }

            // Strip leading label
            match part.find('.') {
                Some(idx) => {
                    part = &part[idx + 1..];
                    if part.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        false
    }
}
