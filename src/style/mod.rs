//! Heuristic writing-style classifier over prior user writing samples.
//!
//! Pure and deterministic: fixed keyword lists and thresholds, no learned
//! model. Feeds the prompt composer's style guidance.

use serde::{Deserialize, Serialize};

/// Overall tone inferred from a user's writing. Also the tone a user can pick
/// directly in their preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Casual,
    Professional,
    Technical,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tone::Casual => "casual",
            Tone::Professional => "professional",
            Tone::Technical => "technical",
        };
        write!(f, "{}", s)
    }
}

/// Vocabulary sophistication inferred from word length distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyLevel {
    Simple,
    Intermediate,
    Advanced,
}

/// Preferred document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructurePreference {
    Narrative,
    Structured,
    Tutorial,
}

/// How the user tends to present code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeExampleStyle {
    Minimal,
    Detailed,
    Annotated,
}

/// Style signals derived from writing samples. Computed on demand, never
/// stored.
#[derive(Debug, Clone, PartialEq)]
pub struct WritingStyle {
    pub tone: Tone,
    pub avg_sentence_length: f32,
    pub vocabulary_level: VocabularyLevel,
    pub structure_preference: StructurePreference,
    pub code_example_style: CodeExampleStyle,
}

impl Default for WritingStyle {
    /// The fixed style used when no samples are available.
    fn default() -> Self {
        Self {
            tone: Tone::Professional,
            avg_sentence_length: 20.0,
            vocabulary_level: VocabularyLevel::Intermediate,
            structure_preference: StructurePreference::Structured,
            code_example_style: CodeExampleStyle::Detailed,
        }
    }
}

const CASUAL_MARKERS: &[&str] = &[
    "gonna", "wanna", "kinda", "sorta", "hey", "awesome", "cool", "stuff",
];

const TECHNICAL_MARKERS: &[&str] = &[
    "implementation",
    "architecture",
    "algorithm",
    "optimization",
    "refactor",
    "middleware",
    "abstraction",
];

const STEP_WORDS: &[&str] = &["first", "second", "then", "next", "finally", "step"];

/// Marker counts must exceed this before a tone other than professional wins.
const TONE_THRESHOLD: usize = 3;
/// Words longer than this count as complex.
const COMPLEX_WORD_LEN: usize = 8;
const ADVANCED_VOCAB_RATIO: f32 = 0.15;
const INTERMEDIATE_VOCAB_RATIO: f32 = 0.08;

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Infer a [`WritingStyle`] from writing samples.
///
/// Returns the default style when `samples` is empty. A heuristic majority
/// vote, not a statistical model.
pub fn analyze_writing_style(samples: &[String]) -> WritingStyle {
    if samples.is_empty() {
        return WritingStyle::default();
    }

    let combined = samples.join("\n");
    let sentences: Vec<&str> = combined
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .collect();
    let words: Vec<String> = combined
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect();

    let avg_sentence_length = if sentences.is_empty() {
        20.0
    } else {
        words.len() as f32 / sentences.len() as f32
    };

    let casual_count = words.iter().filter(|w| CASUAL_MARKERS.contains(&w.as_str())).count();
    let technical_count = words
        .iter()
        .filter(|w| TECHNICAL_MARKERS.contains(&w.as_str()))
        .count();

    let tone = if casual_count > technical_count && casual_count > TONE_THRESHOLD {
        Tone::Casual
    } else if technical_count > casual_count && technical_count > TONE_THRESHOLD {
        Tone::Technical
    } else {
        Tone::Professional
    };

    let complex_words = words.iter().filter(|w| w.len() > COMPLEX_WORD_LEN).count();
    let complex_ratio = if words.is_empty() {
        0.0
    } else {
        complex_words as f32 / words.len() as f32
    };
    let vocabulary_level = if complex_ratio > ADVANCED_VOCAB_RATIO {
        VocabularyLevel::Advanced
    } else if complex_ratio > INTERMEDIATE_VOCAB_RATIO {
        VocabularyLevel::Intermediate
    } else {
        VocabularyLevel::Simple
    };

    let has_numbered_lists = combined.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed
            .split_once('.')
            .map(|(head, _)| !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    });
    let has_bullets = combined
        .lines()
        .any(|line| matches!(line.trim_start().chars().next(), Some('-' | '*' | '+')));
    let has_headings = combined
        .lines()
        .any(|line| line.trim_start().starts_with('#'));
    let has_step_words = words.iter().any(|w| STEP_WORDS.contains(&w.as_str()));

    let structure_preference = if has_step_words || has_numbered_lists {
        StructurePreference::Tutorial
    } else if has_bullets || has_headings {
        StructurePreference::Structured
    } else {
        StructurePreference::Narrative
    };

    let code_blocks = combined.matches("```").count() / 2;
    let inline_code = count_inline_code(&combined);
    let code_comments = combined.matches("//").count() + combined.matches("/*").count();

    let code_example_style = if code_comments > code_blocks {
        CodeExampleStyle::Annotated
    } else if inline_code > code_blocks * 2 {
        CodeExampleStyle::Minimal
    } else {
        CodeExampleStyle::Detailed
    };

    WritingStyle {
        tone,
        avg_sentence_length,
        vocabulary_level,
        structure_preference,
        code_example_style,
    }
}

/// Count single-backtick spans, skipping fenced blocks' triple backticks.
fn count_inline_code(text: &str) -> usize {
    let stripped = text.replace("```", "");
    stripped.matches('`').count() / 2
}

/// Render style guidance to append to a system prompt.
pub fn style_prompt(style: &WritingStyle) -> String {
    let mut out = String::new();

    match style.tone {
        Tone::Casual => out.push_str(
            "Use a casual, conversational tone. Write as if explaining to a friend or \
             colleague. Use contractions and speak directly to the reader. ",
        ),
        Tone::Technical => out.push_str(
            "Use precise technical language and focus on implementation details, \
             architectural decisions, and technical concepts. ",
        ),
        Tone::Professional => out.push_str("Maintain a professional but approachable tone. "),
    }

    if style.avg_sentence_length < 15.0 {
        out.push_str("Keep sentences concise and punchy. ");
    } else if style.avg_sentence_length > 25.0 {
        out.push_str("Use more detailed, comprehensive sentences with thorough explanations. ");
    }

    match style.vocabulary_level {
        VocabularyLevel::Simple => out.push_str(
            "Use clear, simple language that's accessible to developers of all levels. ",
        ),
        VocabularyLevel::Advanced => out.push_str(
            "Use sophisticated technical vocabulary and assume familiarity with advanced \
             concepts. ",
        ),
        VocabularyLevel::Intermediate => out.push_str(
            "Use intermediate-level technical vocabulary with explanations for complex \
             concepts. ",
        ),
    }

    match style.structure_preference {
        StructurePreference::Tutorial => {
            out.push_str("Structure the content as a step-by-step guide with clear progression. ");
        }
        StructurePreference::Structured => {
            out.push_str("Use clear headings, bullet points, and well-organized sections. ");
        }
        StructurePreference::Narrative => {
            out.push_str("Write in a narrative flow that tells the story of the changes. ");
        }
    }

    match style.code_example_style {
        CodeExampleStyle::Minimal => {
            out.push_str("Include concise code snippets that focus on key changes.");
        }
        CodeExampleStyle::Annotated => {
            out.push_str(
                "Provide detailed code examples with comprehensive comments and explanations.",
            );
        }
        CodeExampleStyle::Detailed => {
            out.push_str("Include relevant code examples with appropriate context.");
        }
    }

    out.trim().to_string()
}
