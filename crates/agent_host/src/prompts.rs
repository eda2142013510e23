//! Prompt construction for the coding assistant.
//!
//! `build_prompt` is pure: the same preamble and history always give the same
//! bytes, so prompts can be checked without a network or a page.

use shared::agent_api::{ChatMessage, ProblemContext};

pub const NO_CODE_YET: &str = "No code written yet";

const ROLE: &str = "You are an AI coding assistant on a coding-practice site. Help the student \
understand the problem and improve their own code. Explain ideas and point out mistakes; only \
give a full solution when the student asks for one.";

const REMINDER_ROLE: &str =
    "You are still the student's coding assistant for this problem. Keep answers focused on their code.";

/// Apology shown when a reply could not be produced
pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

/// One-time notice when markdown rendering is unavailable
pub const DEGRADED_NOTICE: &str =
    "Formatting is unavailable right now, so replies will be shown as plain text.";

/// Context block placed ahead of the replayed conversation
#[derive(Debug, Clone, Copy)]
pub enum Preamble<'a> {
    /// Sent until the assistant has answered once in this session
    Full {
        problem: Option<&'a ProblemContext>,
        code: Option<&'a str>,
    },
    /// Lighter reminder for later turns
    Reminder { code: Option<&'a str> },
}

impl Preamble<'_> {
    pub fn text(&self) -> String {
        match self {
            Preamble::Full { problem, code } => {
                let problem_section = match problem {
                    Some(p) => format!(
                        "Problem: {}\nDescription: {}\nInput Format: {}\nOutput Format: {}\nConstraints: {}\nSolution Approach: {}\nExample Solution: {}",
                        p.title,
                        p.body,
                        p.input_format,
                        p.output_format,
                        p.constraints,
                        p.solution_hint,
                        p.reference_solution,
                    ),
                    None => "No problem data available".to_string(),
                };
                format!(
                    "{}\n\n{}\n\nYour Current Code:\n{}",
                    ROLE,
                    problem_section,
                    code.unwrap_or(NO_CODE_YET)
                )
            }
            Preamble::Reminder { code } => format!(
                "{}\n\nYour Current Code:\n{}",
                REMINDER_ROLE,
                code.unwrap_or(NO_CODE_YET)
            ),
        }
    }
}

/// Flatten preamble and history into the single text prompt the API takes.
pub fn build_prompt(preamble: &Preamble<'_>, history: &[ChatMessage]) -> String {
    let mut entries = Vec::with_capacity(history.len() + 1);
    entries.push(format!("Context: {}\n", preamble.text()));
    for msg in history {
        entries.push(format!("{}: {}\n", msg.role.label(), msg.content));
    }
    let mut prompt = entries.join("\n");
    prompt.push_str("\nAssistant:");
    prompt
}

/// Canned message after a reset-in-place.
pub fn greeting(problem: Option<&ProblemContext>) -> String {
    match problem.map(|p| p.title.trim()).filter(|t| !t.is_empty()) {
        Some(title) => format!(
            "Hi! I've loaded \"{}\". Ask me anything about the problem or your code.",
            title
        ),
        None => "Hi! I couldn't load this problem's details, but I can still help with your code."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_sum() -> ProblemContext {
        ProblemContext {
            title: "Two Sum".into(),
            body: "Find two numbers adding to target".into(),
            input_format: "n, array, target".into(),
            output_format: "two indices".into(),
            constraints: "n <= 1e5".into(),
            solution_hint: "Use a hash map".into(),
            reference_solution: "vector<int> twoSum();".into(),
        }
    }

    #[test]
    fn test_full_preamble_layout() {
        let problem = two_sum();
        let history = vec![ChatMessage::user("Why is my loop slow?")];
        let prompt = build_prompt(
            &Preamble::Full {
                problem: Some(&problem),
                code: Some("for(;;){}"),
            },
            &history,
        );

        let expected = format!(
            "Context: {}\n\nProblem: Two Sum\nDescription: Find two numbers adding to target\nInput Format: n, array, target\nOutput Format: two indices\nConstraints: n <= 1e5\nSolution Approach: Use a hash map\nExample Solution: vector<int> twoSum();\n\nYour Current Code:\nfor(;;){{}}\n\nUser: Why is my loop slow?\n\nAssistant:",
            ROLE
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_reminder_omits_problem_statement() {
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("and now?"),
        ];
        let prompt = build_prompt(&Preamble::Reminder { code: None }, &history);

        assert!(!prompt.contains("Problem:"));
        assert!(prompt.contains(NO_CODE_YET));
        assert!(prompt.ends_with("User: and now?\n\nAssistant:"));
        let user_pos = prompt.find("User: hi").unwrap();
        let assistant_pos = prompt.find("Assistant: hello").unwrap();
        assert!(user_pos < assistant_pos);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let problem = two_sum();
        let history = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        let preamble = Preamble::Full {
            problem: Some(&problem),
            code: Some("x"),
        };
        assert_eq!(build_prompt(&preamble, &history), build_prompt(&preamble, &history));
    }

    #[test]
    fn test_missing_problem_data() {
        let text = Preamble::Full {
            problem: None,
            code: None,
        }
        .text();
        assert!(text.contains("No problem data available"));
        assert!(text.ends_with(NO_CODE_YET));
    }

    #[test]
    fn test_greeting_names_problem() {
        assert!(greeting(Some(&two_sum())).contains("\"Two Sum\""));
        assert!(greeting(None).contains("couldn't load"));
    }
}
