//! Prompt composition for the generation request.
//!
//! Pure template assembly over fetched PR data, user preferences, and
//! regeneration options. No model output is parsed here; composing twice
//! from the same input yields byte-identical prompts.

use serde::{Deserialize, Serialize};

use crate::github::PullRequestData;
use crate::style::{self, Tone};

/// Fallback sampling temperature when neither an override nor a preset
/// supplies one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Preferred post length a user can pick in their settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredLength {
    Short,
    Medium,
    Long,
}

impl std::fmt::Display for PreferredLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PreferredLength::Short => "short",
            PreferredLength::Medium => "medium",
            PreferredLength::Long => "long",
        };
        write!(f, "{}", s)
    }
}

/// Per-user personalization settings. Created lazily on first settings
/// visit; mutated via explicit save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    #[serde(default)]
    pub writing_samples: Vec<String>,
    pub preferred_tone: Tone,
    pub preferred_length: PreferredLength,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

/// A named, pre-authored prompt-modifier pair selectable at regeneration
/// time. Seeded centrally; selected, never mutated, by end users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationPreset {
    pub name: String,
    pub description: String,
    pub system_prompt_modifier: String,
    pub user_prompt_modifier: String,
    pub temperature: f32,
    pub is_default: bool,
}

/// How a regeneration should deviate from the default prompts.
#[derive(Debug, Clone)]
pub enum RegenerationMode {
    /// Apply a preset's system/user modifiers and its temperature.
    Preset(RegenerationPreset),
    /// Append a free-form instruction to the user prompt.
    Custom(String),
    /// Lean on the style derived from the user's writing samples.
    UserStyle,
}

/// Ephemeral request parameter for one regeneration.
#[derive(Debug, Clone)]
pub struct RegenerationOptions {
    pub mode: RegenerationMode,
    /// Explicit override; wins over the preset's temperature.
    pub temperature: Option<f32>,
}

impl RegenerationOptions {
    pub fn preset(preset: RegenerationPreset) -> Self {
        Self {
            mode: RegenerationMode::Preset(preset),
            temperature: None,
        }
    }

    pub fn custom(prompt: impl Into<String>) -> Self {
        Self {
            mode: RegenerationMode::Custom(prompt.into()),
            temperature: None,
        }
    }

    pub fn user_style() -> Self {
        Self {
            mode: RegenerationMode::UserStyle,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

const SYSTEM_OPENER: &str = "You are a software engineer writing about your own work. Write in \
first person throughout the entire post (\"I implemented\", \"I discovered\", \"I chose\", etc.). \
Your tone should be pragmatic and informative - focus on technical details, implementation \
decisions, and practical insights.";

const SYSTEM_CLOSER: &str = "When writing:
- Write exclusively in first person - you are the developer who made these changes
- Be pragmatic and informative - focus on what was done and why
- Share technical insights and implementation details
- Explain your reasoning for architectural and design decisions
- Include relevant code snippets that demonstrate key changes
- Structure content with clear, descriptive headings
- Discuss challenges encountered and how you solved them
- End with practical takeaways and lessons learned";

const DEFAULT_USER_INSTRUCTIONS: &str = "Please write a comprehensive blog post that:
1. Explains the purpose and context of these changes
2. Discusses the technical implementation details
3. Highlights any important code changes
4. Includes relevant code examples where appropriate
5. Concludes with the impact and benefits of these changes";

const USER_CLOSER: &str = "Use a professional but engaging tone and format the post in Markdown.";

fn preset_of(options: Option<&RegenerationOptions>) -> Option<&RegenerationPreset> {
    match options {
        Some(RegenerationOptions {
            mode: RegenerationMode::Preset(preset),
            ..
        }) => Some(preset),
        _ => None,
    }
}

/// Build the system prompt.
///
/// Precedence, in order: fixed first-person opener; preset system modifier,
/// else derived style guidance when writing samples exist, else a one-line
/// tone/length instruction when basic preferences exist; custom instructions
/// last; fixed closing checklist always.
pub fn build_system_prompt(
    preferences: Option<&UserPreferences>,
    options: Option<&RegenerationOptions>,
) -> String {
    let mut prompt = String::from(SYSTEM_OPENER);

    let preset_modifier = preset_of(options)
        .map(|p| p.system_prompt_modifier.as_str())
        .filter(|m| !m.is_empty());

    if let Some(modifier) = preset_modifier {
        prompt.push_str("\n\n");
        prompt.push_str(modifier);
    } else if let Some(prefs) = preferences {
        if !prefs.writing_samples.is_empty() {
            let derived = style::analyze_writing_style(&prefs.writing_samples);
            prompt.push_str("\n\nAdapt your writing style to match the user's preferences: ");
            prompt.push_str(&style::style_prompt(&derived));
        } else {
            prompt.push_str(&format!(
                "\n\nWrite in a {} tone with {} length content.",
                prefs.preferred_tone, prefs.preferred_length
            ));
        }
    }

    if let Some(instructions) = preferences
        .and_then(|p| p.custom_instructions.as_deref())
        .filter(|s| !s.is_empty())
    {
        prompt.push_str("\n\nAdditional user instructions: ");
        prompt.push_str(instructions);
    }

    prompt.push_str("\n\n");
    prompt.push_str(SYSTEM_CLOSER);
    prompt
}

/// Build the user prompt: PR title and description verbatim, commit and file
/// counts, one line per commit message and per changed file, then the
/// preset modifier / custom prompt / default instruction list.
pub fn build_user_prompt(
    pr_data: &PullRequestData,
    options: Option<&RegenerationOptions>,
) -> String {
    let commit_lines: Vec<String> = pr_data
        .commits
        .iter()
        .map(|c| format!("- {}", c.message))
        .collect();
    let file_lines: Vec<String> = pr_data
        .files
        .iter()
        .map(|f| {
            format!(
                "- {} ({} additions, {} deletions)",
                f.filename, f.additions, f.deletions
            )
        })
        .collect();

    let mut prompt = format!(
        "Write a detailed technical blog post about the following GitHub pull request:\n\n\
         Title: {}\n\
         Description: {}\n\n\
         Changes:\n\
         - Number of commits: {}\n\
         - Number of files modified: {}\n\n\
         Commit messages:\n{}\n\n\
         Files changed:\n{}",
        pr_data.title,
        pr_data.description,
        pr_data.commits.len(),
        pr_data.files.len(),
        commit_lines.join("\n"),
        file_lines.join("\n"),
    );

    let preset_modifier = preset_of(options)
        .map(|p| p.user_prompt_modifier.as_str())
        .filter(|m| !m.is_empty());

    prompt.push_str("\n\n");
    if let Some(modifier) = preset_modifier {
        prompt.push_str(modifier);
    } else if let Some(RegenerationOptions {
        mode: RegenerationMode::Custom(custom),
        ..
    }) = options
    {
        prompt.push_str(custom);
    } else {
        prompt.push_str(DEFAULT_USER_INSTRUCTIONS);
    }

    prompt.push_str("\n\n");
    prompt.push_str(USER_CLOSER);
    prompt
}

/// Resolve the sampling temperature: explicit override > preset temperature
/// > [`DEFAULT_TEMPERATURE`]. Always within `[0, 1]`.
pub fn temperature(options: Option<&RegenerationOptions>) -> f32 {
    let resolved = options
        .and_then(|o| o.temperature)
        .or_else(|| preset_of(options).map(|p| p.temperature))
        .unwrap_or(DEFAULT_TEMPERATURE);
    resolved.clamp(0.0, 1.0)
}
