// Module: Classifier
// Decides what the page is saying after the control was activated.

use serde::Serialize;

use crate::protocol::Outcome;

/// Case-insensitive "contains any of" matcher.
///
/// Phrases are lowercased once; blank phrases are dropped because they
/// would match every page.
#[derive(Debug, Clone, Default)]
pub struct PhraseSet {
    phrases: Vec<String>,
}

impl PhraseSet {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// First configured phrase contained in `haystack`, in configured order.
    pub fn find(&self, haystack: &str) -> Option<&str> {
        let haystack = haystack.to_lowercase();
        self.phrases
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Text,
    Markup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseMatch {
    pub phrase: String,
    pub source: MatchSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    pub matched: Option<PhraseMatch>,
}

pub struct OutcomeClassifier {
    cooldown: PhraseSet,
    success: PhraseSet,
}

impl OutcomeClassifier {
    pub fn new(cooldown: PhraseSet, success: PhraseSet) -> Self {
        Self { cooldown, success }
    }

    pub fn classify(&self, page_text: &str, page_markup: &str) -> Outcome {
        self.explain(page_text, page_markup).outcome
    }

    /// Rules, in order:
    /// 1. a cooldown phrase in the rendered text → `Cooldown` (text only;
    ///    short-circuits the success check)
    /// 2. a success phrase in the text, then in the markup → `Succeeded`
    /// 3. otherwise `Unconfirmed`
    pub fn explain(&self, page_text: &str, page_markup: &str) -> Classification {
        if let Some(phrase) = self.cooldown.find(page_text) {
            return Classification {
                outcome: Outcome::Cooldown,
                matched: Some(PhraseMatch {
                    phrase: phrase.to_string(),
                    source: MatchSource::Text,
                }),
            };
        }

        let success = self
            .success
            .find(page_text)
            .map(|p| (p, MatchSource::Text))
            .or_else(|| self.success.find(page_markup).map(|p| (p, MatchSource::Markup)));

        match success {
            Some((phrase, source)) => Classification {
                outcome: Outcome::Succeeded,
                matched: Some(PhraseMatch {
                    phrase: phrase.to_string(),
                    source,
                }),
            },
            None => Classification {
                outcome: Outcome::Unconfirmed,
                matched: None,
            },
        }
    }
}
