//! User and content records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A source article attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, alias = "fullText")]
    pub full_text: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, alias = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

impl Article {
    /// Create an article with the required fields.
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        full_text: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            full_text: full_text.into(),
            link: link.into(),
            published_at: None,
        }
    }

    /// Set the publication date.
    pub fn published(mut self, at: impl Into<String>) -> Self {
        self.published_at = Some(at.into());
        self
    }
}

/// An embedding vector stored for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub link: String,
    pub title: String,
    pub source: String,
    pub vector: Vec<f32>,
}

/// Everything stored for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key.
    pub username: String,

    /// Articles to summarize, in display order.
    #[serde(default)]
    pub articles: Vec<Article>,

    /// The user's own prompt.
    #[serde(default)]
    pub prompt: String,

    /// Output format instructions appended to every prompt.
    #[serde(default)]
    pub format_directive: String,

    /// Last generated newsletter.
    #[serde(default)]
    pub newsletter: Option<Value>,

    /// Stored article embeddings.
    #[serde(default)]
    pub embeddings: Vec<StoredEmbedding>,

    /// Set while a newsletter generation is pending.
    #[serde(default)]
    pub is_generating: bool,

    /// Optimistic-concurrency counter, bumped by every write.
    #[serde(default)]
    pub version: i64,
}

impl UserRecord {
    /// Create an empty record.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            articles: Vec::new(),
            prompt: String::new(),
            format_directive: String::new(),
            newsletter: None,
            embeddings: Vec::new(),
            is_generating: false,
            version: 0,
        }
    }

    /// Set the articles.
    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        self.articles = articles;
        self
    }

    /// Set the user prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the format directive.
    pub fn with_format_directive(mut self, directive: impl Into<String>) -> Self {
        self.format_directive = directive.into();
        self
    }

    /// Set stored embeddings.
    pub fn with_embeddings(mut self, embeddings: Vec<StoredEmbedding>) -> Self {
        self.embeddings = embeddings;
        self
    }
}
