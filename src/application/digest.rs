//! Digest rendering.
//!
//! Turns a selected batch into the text handed to the notification sink.
//! The formatter is injected into the dispatch coordinator so the wire
//! format can vary per sink without touching selection logic.

use crate::domain::entities::{DigestSettingsRecord, PhraseRecord};

pub trait DigestFormatter: Send + Sync {
    fn render(&self, phrases: &[PhraseRecord], settings: &DigestSettingsRecord) -> String;
}

const EMPTY_DIGEST: &str = "No phrases available.";

/// Slack mrkdwn digest: numbered phrase entries with the translation,
/// optional tag and note lines, and reply variants drawn as a tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlackMarkdownFormatter;

impl DigestFormatter for SlackMarkdownFormatter {
    fn render(&self, phrases: &[PhraseRecord], settings: &DigestSettingsRecord) -> String {
        if phrases.is_empty() {
            return EMPTY_DIGEST.to_string();
        }

        let mut message = format!("{}\n\n", settings.header);
        for (index, phrase) in phrases.iter().enumerate() {
            message.push_str(&render_phrase(index + 1, phrase, settings));
            if index + 1 < phrases.len() {
                message.push('\n');
            }
        }
        message
    }
}

fn render_phrase(index: usize, phrase: &PhraseRecord, settings: &DigestSettingsRecord) -> String {
    let tag_part = match (&phrase.tag, settings.show_tags) {
        (Some(tag), true) => format!(" `#{tag}`"),
        _ => String::new(),
    };
    let mut rendered = format!(
        "{index}. *\"{}\"* - \"{}\"{tag_part}\n",
        phrase.text, phrase.translation
    );

    if settings.show_notes
        && let Some(note) = &phrase.note
    {
        rendered.push_str(&format!("   _- {note}_\n"));
    }

    if settings.show_replies && !phrase.replies.is_empty() {
        for (position, reply) in phrase.replies.iter().enumerate() {
            let prefix = if position == phrase.replies.len() - 1 {
                "└──"
            } else {
                "├──"
            };
            rendered.push_str(&format!(
                "   {prefix} *\"{}\"* - \"{}\"\n",
                reply.text, reply.translation
            ));
        }
    }

    rendered
}
