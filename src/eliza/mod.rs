//! Eliza responder
//!
//! The session driver only knows the [`Responder`] trait. [`ElizaResponder`]
//! is the reference implementation backed by the keyword script in
//! [`script`].

mod script;

use rand::seq::SliceRandom;
use tracing::debug;

pub use script::{reflect, Rule, SCRIPT, FALLBACK};

/// Closes every reply turn so clients know the doctor has finished talking.
pub const TURN_DELIMITER: &str = "---";
pub const FAREWELL: &str = "Alright then, goodbye!";
pub const SILENCE: &str = "I can't help if you will not chat with me!";

const FAREWELL_KEYWORDS: [&str; 2] = ["bye", "goodbye"];

/// Utterances produced for one client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub utterances: Vec<String>,
    /// Close the session once the utterances are sent.
    pub farewell: bool,
}

impl Reply {
    pub fn new(utterances: Vec<String>) -> Self {
        Self { utterances, farewell: false }
    }

    pub fn farewell(utterances: Vec<String>) -> Self {
        Self { utterances, farewell: true }
    }
}

/// Maps one input utterance to the reply utterances. Must be stateless:
/// a single instance is shared by every session.
#[cfg_attr(test, mockall::automock)]
pub trait Responder: Send + Sync {
    fn respond(&self, input: &str) -> Reply;
}

#[derive(Debug, Default, Clone)]
pub struct ElizaResponder;

impl ElizaResponder {
    pub fn new() -> Self {
        Self
    }

    /// Picks Eliza's line for `input`, without the echo and delimiter framing.
    pub fn answer(&self, input: &str) -> String {
        let words = tokenize(input);
        let mut rng = rand::thread_rng();

        for rule in SCRIPT {
            let Some(rest) = rule.find(&words) else {
                continue;
            };
            let remainder = reflect(&rest.join(" "));
            let candidates: Vec<&str> = rule
                .responses
                .iter()
                .copied()
                .filter(|r| !r.contains("{}") || !remainder.is_empty())
                .collect();

            if let Some(template) = candidates.choose(&mut rng) {
                debug!("Matched keyword {:?}", rule.keywords);
                return template.replace("{}", &remainder);
            }
        }

        FALLBACK
            .choose(&mut rng)
            .copied()
            .unwrap_or("Please go on.")
            .to_string()
    }
}

impl Responder for ElizaResponder {
    fn respond(&self, input: &str) -> Reply {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Reply::new(vec![SILENCE.to_string(), TURN_DELIMITER.to_string()]);
        }

        let words = tokenize(trimmed);
        if words.iter().any(|w| FAREWELL_KEYWORDS.contains(&w.as_str())) {
            return Reply::farewell(vec![FAREWELL.to_string()]);
        }

        Reply::new(vec![
            format!("> {}", trimmed),
            self.answer(trimmed),
            TURN_DELIMITER.to_string(),
        ])
    }
}

/// Lower-cases and splits on anything that is not a letter, digit or apostrophe.
fn tokenize(input: &str) -> Vec<String> {
    input
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maybe_has_single_response() {
        let reply = ElizaResponder::new().respond("Maybe my mind is disturbed...");
        assert_eq!(
            reply.utterances,
            vec![
                "> Maybe my mind is disturbed...".to_string(),
                "You don't seem very certain.".to_string(),
                "---".to_string(),
            ]
        );
        assert!(!reply.farewell);
    }

    #[test]
    fn test_farewell() {
        let reply = ElizaResponder::new().respond("OK, bye now");
        assert_eq!(reply, Reply::farewell(vec![FAREWELL.to_string()]));

        // Substrings are not farewells
        let reply = ElizaResponder::new().respond("I bought a by-product");
        assert!(!reply.farewell);
    }

    #[test]
    fn test_blank_input() {
        let reply = ElizaResponder::new().respond("   ");
        assert_eq!(reply.utterances, vec![SILENCE.to_string(), TURN_DELIMITER.to_string()]);
    }

    #[test]
    fn test_non_empty_input_always_replies() {
        let responder = ElizaResponder::new();
        for input in ["hello", "xyzzy", "I am sad", "because", "?!"] {
            let reply = responder.respond(input);
            assert!(!reply.utterances.is_empty(), "no reply for {input:?}");
            assert_eq!(reply.utterances.last().map(String::as_str), Some(TURN_DELIMITER));
        }
    }

    #[test]
    fn test_reflected_remainder() {
        let answer = ElizaResponder::new().answer("I am worried about my exams");
        let expected = [
            "How long have you been worried about your exams?",
            "Did you come to me because you are worried about your exams?",
            "Do you enjoy being worried about your exams?",
        ];
        assert!(expected.contains(&answer.as_str()), "unexpected answer {answer:?}");
    }

    #[test]
    fn test_slot_responses_skipped_without_remainder() {
        for _ in 0..20 {
            let answer = ElizaResponder::new().answer("I remember");
            assert!(!answer.contains("{}"));
            assert!(!answer.ends_with(" ?"));
        }
    }

    #[test]
    fn test_unmatched_input_uses_fallback() {
        let answer = ElizaResponder::new().answer("xyzzy plugh");
        assert!(FALLBACK.contains(&answer.as_str()));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("I'm here, OK?"), vec!["i'm", "here", "ok"]);
        assert!(tokenize("...").is_empty());
    }
}
