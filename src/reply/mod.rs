//! Keyword auto-reply lookup.
//!
//! Pure query over a user's keyword table: the first stored key that
//! occurs as a substring of the lower-cased inbound text wins. Which key
//! wins when several match is deliberately unspecified.

use std::collections::HashMap;
use std::sync::Arc;

use crate::store::AccountStore;

/// Returns the reply for the first key contained in `text`, if any.
#[must_use]
pub fn match_keyword<'a>(keywords: &'a HashMap<String, String>, text: &str) -> Option<&'a str> {
    let text = text.to_lowercase();
    keywords
        .iter()
        .find(|(key, _)| text.contains(key.as_str()))
        .map(|(_, reply)| reply.as_str())
}

/// Store-backed auto-reply lookup.
#[derive(Debug, Clone)]
pub struct AutoReply {
    store: Arc<AccountStore>,
}

impl AutoReply {
    #[must_use]
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }

    /// Looks up a reply for the user's inbound text. No side effects.
    pub async fn lookup(&self, user_id: &str, text: &str) -> Option<String> {
        let account = self.store.get(user_id).await?;
        match_keyword(&account.keywords, text).map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_case_insensitive_substring_match() {
        let keywords = table(&[("halo", "Hai")]);
        assert_eq!(match_keyword(&keywords, "HALO bro"), Some("Hai"));
        assert_eq!(match_keyword(&keywords, "say halo!"), Some("Hai"));
    }

    #[test]
    fn test_no_match() {
        let keywords = table(&[("halo", "Hai")]);
        assert_eq!(match_keyword(&keywords, "good morning"), None);
        assert_eq!(match_keyword(&HashMap::new(), "halo"), None);
    }

    #[tokio::test]
    async fn test_lookup_without_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AccountStore::open(dir.path().join("data.json")).unwrap());
        let reply = AutoReply::new(store);

        assert_eq!(reply.lookup("1", "halo").await, None);
    }

    #[tokio::test]
    async fn test_lookup_with_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AccountStore::open(dir.path().join("data.json")).unwrap());
        store.add_keyword("1", "Halo", "Hai").await.unwrap();

        let reply = AutoReply::new(store);
        assert_eq!(reply.lookup("1", "HALO bro").await.as_deref(), Some("Hai"));
        assert_eq!(reply.lookup("2", "HALO bro").await, None);
    }
}
