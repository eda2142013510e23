//! Read access to the site's locally cached draft code.

use shared::route::code_cache_key;
use shared::window::{Storage, StorageChange};
use tokio::sync::broadcast;

/// Which part of the cache key could not be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPart {
    StudentId,
    ProblemId,
    Language,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeKey {
    pub student_id: String,
    pub problem_id: String,
    pub language: String,
}

impl CodeKey {
    pub fn resolve(
        student_id: Option<&str>,
        problem_id: Option<&str>,
        language: Option<&str>,
    ) -> Result<Self, MissingPart> {
        fn non_blank(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        Ok(Self {
            student_id: non_blank(student_id).ok_or(MissingPart::StudentId)?.to_string(),
            problem_id: non_blank(problem_id).ok_or(MissingPart::ProblemId)?.to_string(),
            language: non_blank(language).ok_or(MissingPart::Language)?.to_string(),
        })
    }

    pub fn storage_key(&self) -> String {
        code_cache_key(&self.student_id, &self.problem_id, &self.language)
    }
}

#[derive(Clone)]
pub struct CodeCache {
    storage: Storage,
}

impl CodeCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn lookup(&self, key: &CodeKey) -> Option<String> {
        self.storage.get_item(&key.storage_key())
    }

    pub fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.storage.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_reports_first_missing_part() {
        assert_eq!(
            CodeKey::resolve(None, Some("1"), Some("cpp")),
            Err(MissingPart::StudentId)
        );
        assert_eq!(
            CodeKey::resolve(Some("42"), None, Some("cpp")),
            Err(MissingPart::ProblemId)
        );
        assert_eq!(
            CodeKey::resolve(Some("42"), Some("1"), Some("  ")),
            Err(MissingPart::Language)
        );
    }

    #[test]
    fn test_lookup_reads_site_key() {
        let storage = Storage::default();
        storage.set_item("course_42_1234_cpp", "int main() { return 0; }");
        let cache = CodeCache::new(storage);

        let key = CodeKey::resolve(Some("42"), Some("1234"), Some(" cpp ")).unwrap();
        assert_eq!(key.storage_key(), "course_42_1234_cpp");
        assert_eq!(cache.lookup(&key).as_deref(), Some("int main() { return 0; }"));
    }
}
