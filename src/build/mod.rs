pub mod barrel_builder;
pub mod forward_builder;
pub mod lexicon_builder;

use serde::Deserialize;

/// One line of the bootstrap corpus: either pre-tokenized (`tokens`) or raw
/// `title` + `abstract` text to tokenize.
#[derive(Debug, Deserialize)]
pub struct CorpusDoc {
    #[serde(default)]
    pub doc_id: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub body_tokens: Option<Vec<String>>,
}

impl CorpusDoc {
    /// The body token list, preferring pre-tokenized fields.
    pub fn body_tokens(&self, tokenizer: &crate::analysis::tokenizer::Tokenizer) -> Vec<String> {
        if let Some(tokens) = &self.tokens {
            return tokens.clone();
        }
        if let Some(tokens) = &self.body_tokens {
            return tokens.clone();
        }
        let mut text = String::new();
        if let Some(title) = &self.title {
            text.push_str(title);
            text.push(' ');
        }
        if let Some(summary) = &self.summary {
            text.push_str(summary);
        }
        tokenizer.normalize(&text)
    }
}
