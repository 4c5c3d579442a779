//! Template responses to viewer comments.
//!
//! A comment is classified by keyword into a category, then the category's
//! templates are used in rotation. `{username}` in a template is replaced
//! with the commenter's name.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use zunda_core::events::ANONYMOUS_USERNAME;

pub const GREETING: &str = "greeting";
pub const QUESTION: &str = "question";
pub const COMPLIMENT: &str = "compliment";
pub const DEFAULT_CATEGORY: &str = "default";

const USERNAME_PLACEHOLDER: &str = "{username}";

/// Checked in order; the first category with a matching keyword wins.
const KEYWORDS: &[(&str, &[&str])] = &[
    (GREETING, &["こんにちは", "おはよう", "こんばんは", "はじめまして"]),
    (QUESTION, &["?", "？", "どう", "なぜ", "教えて"]),
    (COMPLIMENT, &["かわいい", "すごい", "いいね", "素晴らしい"]),
];

fn builtin_templates() -> HashMap<String, Vec<String>> {
    let table: [(&str, [&str; 3]); 4] = [
        (
            GREETING,
            [
                "{username}さん、こんにちはなのだ！",
                "やっほー、{username}さん！",
                "{username}さん、いらっしゃいなのだ！",
            ],
        ),
        (
            QUESTION,
            [
                "{username}さん、質問ありがとうございます！",
                "うーん、{username}さんの質問は難しいのだ...",
                "{username}さん、いい質問なのだ！",
            ],
        ),
        (
            COMPLIMENT,
            [
                "{username}さん、ありがとうございます！",
                "えへへ、{username}さんに褒められて嬉しいのだ！",
                "{username}さん、そんなこと言われると照れるのだ...",
            ],
        ),
        (
            DEFAULT_CATEGORY,
            [
                "{username}さん、コメントありがとうございます！",
                "{username}さんのコメント、読ませてもらったのだ！",
                "{username}さん、いつもありがとうございます！",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(category, templates)| {
            (
                category.to_string(),
                templates.iter().map(ToString::to_string).collect(),
            )
        })
        .collect()
}

/// Keyword category for a comment.
pub fn classify(text: &str) -> &'static str {
    let text = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map_or(DEFAULT_CATEGORY, |(category, _)| *category)
}

/// The acknowledgement spoken before the response proper.
pub fn acknowledgement(username: &str) -> String {
    format!("{}さん、コメントありがとうございます！", display_name(username))
}

fn display_name(username: &str) -> &str {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        ANONYMOUS_USERNAME
    } else {
        trimmed
    }
}

#[derive(Debug, Default)]
struct Rotation {
    templates: HashMap<String, Vec<String>>,
    next: HashMap<String, usize>,
}

/// Picks a response template for each comment.
#[derive(Debug)]
pub struct CommentResponder {
    rotation: Mutex<Rotation>,
}

impl Default for CommentResponder {
    fn default() -> Self {
        Self {
            rotation: Mutex::new(Rotation {
                templates: builtin_templates(),
                next: HashMap::new(),
            }),
        }
    }
}

impl CommentResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a template to a category, creating the category if needed.
    pub fn add_template(&self, category: &str, template: impl Into<String>) {
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        rotation
            .templates
            .entry(category.to_string())
            .or_default()
            .push(template.into());
    }

    /// Response line for a comment.
    pub fn respond(&self, username: &str, text: &str) -> String {
        let category = classify(text);
        let template = self.next_template(category);
        template.replace(USERNAME_PLACEHOLDER, display_name(username))
    }

    fn next_template(&self, category: &str) -> String {
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let category = if rotation
            .templates
            .get(category)
            .is_some_and(|t| !t.is_empty())
        {
            category
        } else {
            DEFAULT_CATEGORY
        };
        let Some(count) = rotation.templates.get(category).map(Vec::len).filter(|n| *n > 0) else {
            return format!("{USERNAME_PLACEHOLDER}さん、コメントありがとうございます！");
        };
        let slot = rotation.next.entry(category.to_string()).or_insert(0);
        let index = *slot % count;
        *slot = index + 1;
        rotation.templates[category][index].clone()
    }
}
