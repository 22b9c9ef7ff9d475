//! Prompt construction for per-article generation.

use newsdesk_store::Article;

/// Characters of article text included in a prompt.
pub const MAX_ARTICLE_CHARS: usize = 4000;

/// System instruction sent with every newsletter request.
pub const NEWSLETTER_SYSTEM: &str =
    "You write concise newsletter entries. Respond with a single JSON object.";

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Builds the prompt for one article from typed parts.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    max_article_chars: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            max_article_chars: MAX_ARTICLE_CHARS,
        }
    }
}

impl PromptTemplate {
    /// Render the prompt for `article`.
    ///
    /// Article fields are inserted as plain values; nothing in them is
    /// interpreted as template syntax.
    pub fn render(&self, instructions: &str, article: &Article, format_directive: &str) -> String {
        let mut prompt = String::with_capacity(
            instructions.len() + format_directive.len() + self.max_article_chars + 128,
        );

        let instructions = instructions.trim();
        if !instructions.is_empty() {
            prompt.push_str(instructions);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Title: ");
        prompt.push_str(article.title.trim());
        prompt.push_str("\nSource: ");
        prompt.push_str(article.source.trim());
        prompt.push_str("\n\nArticle:\n");
        prompt.push_str(truncate_chars(&article.full_text, self.max_article_chars));

        let format_directive = format_directive.trim();
        if !format_directive.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(format_directive);
        }
        prompt
    }

    /// Text sent to the embedding model for `article`.
    pub fn embedding_input(&self, article: &Article) -> String {
        format!(
            "{}\n\n{}",
            article.title.trim(),
            truncate_chars(&article.full_text, self.max_article_chars)
        )
    }
}
