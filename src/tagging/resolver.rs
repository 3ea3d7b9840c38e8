use std::collections::HashMap;
use std::sync::Arc;

use super::schema::{FileRecord, JOB_FOLDER_KEY};
use crate::error::{Result, TagError};
use crate::relay::credential::CredentialGate;
use crate::relay::RelayClient;

/// Suffix gallery UIs append to truncated names.
const ELLIPSIS: &str = "...";

/// Resolves display names to remote file records, caching hits for the
/// lifetime of the resolver.
pub struct FileResolver {
    relay: Arc<dyn RelayClient>,
    gate: CredentialGate,
    cache: HashMap<String, FileRecord>,
}

impl FileResolver {
    pub fn new(relay: Arc<dyn RelayClient>, gate: CredentialGate) -> Self {
        Self {
            relay,
            gate,
            cache: HashMap::new(),
        }
    }

    /// Cached record for `display_name`, or a fresh search.
    ///
    /// `Ok(None)` means the search ran but nothing matched.
    pub async fn resolve(&mut self, display_name: &str) -> Result<Option<FileRecord>> {
        if let Some(hit) = self.cache.get(display_name) {
            tracing::trace!(filename = display_name, "Resolver cache hit");
            return Ok(Some(hit.clone()));
        }
        self.lookup(display_name).await
    }

    /// Re-searches `display_name`, overwriting the cached record when found.
    pub async fn refresh(&mut self, display_name: &str) -> Result<Option<FileRecord>> {
        self.lookup(display_name).await
    }

    /// Stores `record` as the current state of `display_name`.
    pub fn remember(&mut self, display_name: &str, record: FileRecord) {
        self.cache.insert(display_name.to_string(), record);
    }

    pub fn cached(&self, display_name: &str) -> Option<&FileRecord> {
        self.cache.get(display_name)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn lookup(&mut self, display_name: &str) -> Result<Option<FileRecord>> {
        let credential = self.gate.require()?;
        let candidates = self
            .relay
            .search_files(display_name, &credential)
            .await
            .map_err(|e| match e {
                TagError::CredentialExpired => e,
                other => TagError::ResolutionFailed {
                    filename: display_name.to_string(),
                    reason: other.to_string(),
                },
            })?;
        let count = candidates.len();

        match best_match(display_name, candidates) {
            Some(record) => {
                tracing::debug!(filename = display_name, id = %record.id, "Resolved file");
                self.remember(display_name, record.clone());
                Ok(Some(record))
            }
            None => {
                tracing::debug!(filename = display_name, candidates = count, "No matching file");
                Ok(None)
            }
        }
    }
}

/// Picks the candidate for `query`, in priority order: exact filename, exact
/// title, filename prefix, title prefix. Prefix checks drop one trailing
/// `"..."` from the query first.
pub fn best_match(query: &str, candidates: Vec<FileRecord>) -> Option<FileRecord> {
    let stem = query.strip_suffix(ELLIPSIS).unwrap_or(query);

    let rules: [&dyn Fn(&FileRecord) -> bool; 4] = [
        &|f: &FileRecord| f.filename() == query,
        &|f: &FileRecord| f.title() == query,
        &|f: &FileRecord| f.filename().starts_with(stem),
        &|f: &FileRecord| f.title().starts_with(stem),
    ];

    let pos = rules
        .iter()
        .find_map(|rule| candidates.iter().position(|f| rule(f)))?;
    candidates.into_iter().nth(pos)
}

/// Job folder number already assigned to `record`, if any.
pub fn job_folder_number(record: &FileRecord) -> Option<&str> {
    record
        .tag(JOB_FOLDER_KEY)
        .and_then(|t| t.string_value())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::credential::Credential;
    use crate::relay::{RelayRequest, RelayResponse, SearchReply};
    use crate::tagging::schema::{Tag, TagValue};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn file(id: &str, filename: &str, title: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            filename: Some(filename.into()),
            title: Some(title.into()),
            ..FileRecord::default()
        }
    }

    struct SearchOnly {
        replies: Mutex<Vec<SearchReply>>,
        calls: Mutex<usize>,
    }

    impl SearchOnly {
        fn new(replies: Vec<SearchReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl RelayClient for SearchOnly {
        async fn call(&self, request: RelayRequest) -> Result<RelayResponse> {
            assert!(matches!(request, RelayRequest::SearchFiles { .. }));
            *self.calls.lock() += 1;
            let mut replies = self.replies.lock();
            let reply = if replies.is_empty() {
                SearchReply::default()
            } else {
                replies.remove(0)
            };
            Ok(RelayResponse::Search(reply))
        }
    }

    fn found(files: Vec<FileRecord>) -> SearchReply {
        SearchReply {
            files,
            ..SearchReply::default()
        }
    }

    fn gate() -> CredentialGate {
        CredentialGate::fixed(Credential::parse("tok"))
    }

    #[test]
    fn exact_match_beats_prefix_match() {
        let candidates = vec![
            file("1", "Report.pdf.bak", ""),
            file("2", "Report.pdf", ""),
        ];
        assert_eq!(best_match("Report.pdf", candidates).unwrap().id, "2");
    }

    #[test]
    fn exact_title_beats_filename_prefix() {
        let candidates = vec![
            file("1", "Quarterly summary.docx", ""),
            file("2", "q3.docx", "Quarterly summary"),
        ];
        assert_eq!(best_match("Quarterly summary", candidates).unwrap().id, "2");
    }

    #[test]
    fn truncated_name_matches_by_prefix() {
        let candidates = vec![
            file("1", "Other.pdf", ""),
            file("2", "My Long File Name.pdf", ""),
        ];
        let hit = best_match("My Long File Na...", candidates).unwrap();
        assert_eq!(hit.id, "2");
    }

    #[test]
    fn strips_exactly_one_ellipsis() {
        let candidates = vec![file("1", "Notes.pdf", "")];
        assert!(best_match("Notes......", candidates).is_none());

        let candidates = vec![file("1", "Notes...pdf", "")];
        assert_eq!(best_match("Notes......", candidates).unwrap().id, "1");
    }

    #[test]
    fn title_prefix_is_last_resort() {
        let candidates = vec![file("1", "x.pdf", "Site inspection north wing")];
        assert_eq!(best_match("Site inspection...", candidates).unwrap().id, "1");
        assert!(best_match("Missing", vec![file("1", "x.pdf", "y")]).is_none());
    }

    #[test]
    fn job_folder_number_requires_non_empty_string() {
        let mut record = file("1", "a", "");
        assert_eq!(job_folder_number(&record), None);

        record.tags.push(Tag::new(JOB_FOLDER_KEY, TagValue::String(String::new())));
        assert_eq!(job_folder_number(&record), None);

        record.tags = vec![Tag::new(JOB_FOLDER_KEY, TagValue::String("JF7".into()))];
        assert_eq!(job_folder_number(&record), Some("JF7"));
    }

    #[tokio::test]
    async fn resolve_caches_hits_and_refresh_overwrites() {
        let relay = SearchOnly::new(vec![
            found(vec![file("1", "a.pdf", "")]),
            found(vec![file("1b", "a.pdf", "")]),
        ]);
        let mut resolver = FileResolver::new(relay.clone(), gate());

        assert_eq!(resolver.resolve("a.pdf").await.unwrap().unwrap().id, "1");
        assert_eq!(resolver.resolve("a.pdf").await.unwrap().unwrap().id, "1");
        assert_eq!(*relay.calls.lock(), 1);

        assert_eq!(resolver.refresh("a.pdf").await.unwrap().unwrap().id, "1b");
        assert_eq!(resolver.cached("a.pdf").unwrap().id, "1b");
        assert_eq!(*relay.calls.lock(), 2);
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let relay = SearchOnly::new(vec![found(vec![]), found(vec![file("1", "a.pdf", "")])]);
        let mut resolver = FileResolver::new(relay.clone(), gate());

        assert!(resolver.resolve("a.pdf").await.unwrap().is_none());
        assert_eq!(resolver.cache_len(), 0);
        assert!(resolver.resolve("a.pdf").await.unwrap().is_some());
        assert_eq!(*relay.calls.lock(), 2);
    }

    #[tokio::test]
    async fn expiry_is_propagated() {
        let relay = SearchOnly::new(vec![SearchReply {
            expired: true,
            ..SearchReply::default()
        }]);
        let mut resolver = FileResolver::new(relay, gate());

        let err = resolver.resolve("a.pdf").await.unwrap_err();
        assert_eq!(err, TagError::CredentialExpired);
    }

    #[tokio::test]
    async fn failed_search_is_a_resolution_failure() {
        let relay = SearchOnly::new(vec![SearchReply {
            status: Some(500),
            error: Some("Search failed: 500".into()),
            ..SearchReply::default()
        }]);
        let mut resolver = FileResolver::new(relay, gate());

        let err = resolver.resolve("a.pdf").await.unwrap_err();
        assert_eq!(
            err,
            TagError::ResolutionFailed {
                filename: "a.pdf".into(),
                reason: "relay error: Search failed: 500".into(),
            }
        );
        assert_eq!(resolver.cache_len(), 0);
    }

    #[tokio::test]
    async fn missing_credential_skips_search() {
        let relay = SearchOnly::new(vec![]);
        let mut resolver = FileResolver::new(relay.clone(), CredentialGate::fixed(None));

        let err = resolver.resolve("a.pdf").await.unwrap_err();
        assert_eq!(err, TagError::MissingCredential);
        assert_eq!(*relay.calls.lock(), 0);
    }
}
