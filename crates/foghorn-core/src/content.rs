//! Structured content document and the render boundary.
//!
//! Broadcast content is authored as a block document and transformed into
//! transport HTML immediately before provider transmission. The transform
//! is a seam ([`ContentRenderer`]); the built-in [`HtmlRenderer`] covers
//! the block set below and resolves media references to absolute URLs.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Paragraph { text: String },
    Heading { level: u8, text: String },
    Image { src: String, alt: Option<String> },
    Button { label: String, href: String },
    Divider,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub blocks: Vec<ContentBlock>,
}

impl ContentDocument {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ContentBlock::Paragraph { text: text.into() }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Stable serialized form used for change detection between saves.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(&self.blocks).unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid media reference: {0}")]
    Media(String),
}

pub trait ContentRenderer: Send + Sync {
    fn render(&self, document: &ContentDocument) -> Result<String, RenderError>;
}

/// Minimal block-to-HTML renderer. Relative media references are resolved
/// against `media_base_url`; without a base, relative references are a
/// render error since providers need absolute URLs.
pub struct HtmlRenderer {
    media_base_url: Option<Url>,
}

impl HtmlRenderer {
    pub fn new(media_base_url: Option<Url>) -> Self {
        Self { media_base_url }
    }

    fn resolve_media(&self, src: &str) -> Result<String, RenderError> {
        if let Ok(url) = Url::parse(src) {
            return Ok(url.to_string());
        }
        match &self.media_base_url {
            Some(base) => base
                .join(src)
                .map(|u| u.to_string())
                .map_err(|_| RenderError::Media(src.to_string())),
            None => Err(RenderError::Media(src.to_string())),
        }
    }
}

impl ContentRenderer for HtmlRenderer {
    fn render(&self, document: &ContentDocument) -> Result<String, RenderError> {
        let mut html = String::new();
        for block in &document.blocks {
            match block {
                ContentBlock::Paragraph { text } => {
                    html.push_str(&format!("<p>{}</p>", escape(text)));
                }
                ContentBlock::Heading { level, text } => {
                    let level = (*level).clamp(1, 6);
                    html.push_str(&format!("<h{level}>{}</h{level}>", escape(text)));
                }
                ContentBlock::Image { src, alt } => {
                    let src = self.resolve_media(src)?;
                    let alt = alt.as_deref().unwrap_or("");
                    html.push_str(&format!("<img src=\"{}\" alt=\"{}\"/>", src, escape(alt)));
                }
                ContentBlock::Button { label, href } => {
                    html.push_str(&format!(
                        "<a class=\"btn\" href=\"{}\">{}</a>",
                        href,
                        escape(label)
                    ));
                }
                ContentBlock::Divider => html.push_str("<hr/>"),
            }
        }
        Ok(html)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
