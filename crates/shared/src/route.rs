//! Problem route classification and code-cache key derivation.

use regex::Regex;

/// Matches paths against the problem route prefix (e.g. `/problems/`).
#[derive(Debug, Clone)]
pub struct ProblemRoutes {
    prefix: String,
    id_re: Regex,
}

impl ProblemRoutes {
    pub fn new(prefix: &str) -> Self {
        // Greedy segment match so the digits follow the last hyphen of the slug.
        let pattern = format!(r"^{}[^/]*-(\d+)", regex::escape(prefix));
        Self {
            prefix: prefix.to_string(),
            id_re: Regex::new(&pattern).expect("escaped prefix is a valid pattern"),
        }
    }

    pub fn is_problem_route(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Numeric problem id parsed from the slug, e.g. `/problems/two-sum-1234` → `1234`.
    pub fn problem_id(&self, path: &str) -> Option<String> {
        self.id_re
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Local storage key the site uses for a student's draft code.
pub fn code_cache_key(student_id: &str, problem_id: &str, language: &str) -> String {
    format!("course_{}_{}_{}", student_id, problem_id, language)
}
