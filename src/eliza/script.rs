/// A keyword rule. `{}` in a response is replaced by the reflected words that
/// follow the keyword in the input.
#[derive(Debug)]
pub struct Rule {
    pub keywords: &'static [&'static str],
    pub responses: &'static [&'static str],
}

impl Rule {
    /// Returns the words following the first keyword phrase found in `words`.
    pub fn find<'a>(&self, words: &'a [String]) -> Option<&'a [String]> {
        self.keywords.iter().find_map(|keyword| {
            let phrase: Vec<&str> = keyword.split_whitespace().collect();
            if phrase.is_empty() || phrase.len() > words.len() {
                return None;
            }
            (0..=words.len() - phrase.len())
                .find(|&start| {
                    words[start..start + phrase.len()]
                        .iter()
                        .zip(&phrase)
                        .all(|(w, p)| w == p)
                })
                .map(|start| &words[start + phrase.len()..])
        })
    }
}

// Highest priority first.
pub static SCRIPT: &[Rule] = &[
    Rule {
        keywords: &["sorry", "apologise", "apologize"],
        responses: &[
            "Please don't apologize.",
            "Apologies are not necessary.",
            "What feelings do you have when you apologize?",
        ],
    },
    Rule {
        keywords: &["maybe"],
        responses: &["You don't seem very certain."],
    },
    Rule {
        keywords: &["perhaps"],
        responses: &["Why the uncertain tone?", "You aren't sure?"],
    },
    Rule {
        keywords: &["i remember"],
        responses: &[
            "Do you often think of {}?",
            "Why do you recall {} just now?",
            "What else do you remember?",
        ],
    },
    Rule {
        keywords: &["dream", "dreams", "dreamt"],
        responses: &[
            "What does that dream suggest to you?",
            "Do you dream often?",
            "Do you believe that dreams have something to do with your problem?",
        ],
    },
    Rule {
        keywords: &["computer", "computers", "machine"],
        responses: &[
            "Do computers worry you?",
            "Why do you mention computers?",
            "What do you think machines have to do with your problem?",
        ],
    },
    Rule {
        keywords: &["mother", "father", "family", "sister", "brother"],
        responses: &[
            "Tell me more about your family.",
            "How do you get along with your family?",
        ],
    },
    Rule {
        keywords: &["i am", "i'm"],
        responses: &[
            "How long have you been {}?",
            "Did you come to me because you are {}?",
            "Do you enjoy being {}?",
        ],
    },
    Rule {
        keywords: &["i feel"],
        responses: &["Do you often feel {}?", "Tell me more about such feelings."],
    },
    Rule {
        keywords: &["you are", "you're"],
        responses: &[
            "What makes you think I am {}?",
            "Does it please you to believe I am {}?",
        ],
    },
    Rule {
        keywords: &["because"],
        responses: &[
            "Is that the real reason?",
            "What other reasons might there be?",
            "Does that reason seem to explain anything else?",
        ],
    },
    Rule {
        keywords: &["always"],
        responses: &["Can you think of a specific example?", "When?", "Really, always?"],
    },
    Rule {
        keywords: &["yes"],
        responses: &["You seem quite positive.", "Are you sure?", "I understand."],
    },
    Rule {
        keywords: &["no"],
        responses: &["Why not?", "Are you saying no just to be negative?"],
    },
    Rule {
        keywords: &["hello", "hi", "hey"],
        responses: &["How do you do. Please state your problem."],
    },
];

pub static FALLBACK: &[&str] = &[
    "Please go on.",
    "I see.",
    "Can you elaborate on that?",
    "That is interesting. Please continue.",
];

const REFLECTIONS: &[(&str, &str)] = &[
    ("am", "are"),
    ("was", "were"),
    ("i", "you"),
    ("i'm", "you are"),
    ("i'd", "you would"),
    ("i've", "you have"),
    ("i'll", "you will"),
    ("my", "your"),
    ("me", "you"),
    ("myself", "yourself"),
    ("mine", "yours"),
    ("are", "am"),
    ("you", "me"),
    ("you're", "I am"),
    ("you've", "I have"),
    ("you'll", "I will"),
    ("your", "my"),
    ("yours", "mine"),
    ("yourself", "myself"),
];

/// Swaps first and second person so a phrase can be said back to the patient.
pub fn reflect(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            REFLECTIONS
                .iter()
                .find(|(from, _)| *from == lower)
                .map(|(_, to)| (*to).to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
