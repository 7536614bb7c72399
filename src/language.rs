//! Slice-vote language detection over an external classifier.
//!
//! The classifier itself is opaque; anything that can label a piece of text
//! with a language code and a confidence implements [`LanguageModel`].

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z_ !.,;:?]").expect("valid charset regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// Label prefix used by fastText-style classifiers
const LABEL_PREFIX: &str = "__label__";

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Language code, with or without the `__label__` prefix
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn language(&self) -> &str {
        self.label.strip_prefix(LABEL_PREFIX).unwrap_or(&self.label)
    }
}

pub trait LanguageModel {
    /// Top prediction for `text`, or `None` when the model cannot decide.
    fn predict(&self, text: &str) -> Option<Prediction>;
}

/// Strip markup, lowercase, drop everything but ASCII letters, `_`, space
/// and `!.,;:?`, then collapse whitespace.
pub fn preprocess_text(text: &str) -> String {
    let untagged = TAG_RE.replace_all(text, "");
    let lowered = untagged.to_lowercase();
    // whitespace other than ' ' is dropped here, same as any other char
    let kept = DISALLOWED_RE.replace_all(&lowered, "");
    SPACE_RE.replace_all(&kept, " ").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Number of equal slices the text is cut into
    pub slices: usize,
    /// Target predictions below this confidence count against the target
    pub min_confidence: f32,
    /// Minimum slices voting for the target language
    pub min_true: usize,
    /// Maximum slices voting against it
    pub max_false: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            slices: 1,
            min_confidence: 0.6,
            min_true: 1,
            max_false: 0,
        }
    }
}

pub struct LanguageDetector<M: LanguageModel> {
    model: M,
}

impl<M: LanguageModel> LanguageDetector<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Is `text` written in `target`?
    ///
    /// The preprocessed text is cut into `params.slices` pieces of
    /// `ceil(len / slices)` chars. A piece votes for the target only with a
    /// confident target label; any other prediction votes against it, and a
    /// piece the model cannot label abstains.
    pub fn is_language(&self, text: &str, target: &str, params: &DetectionParams) -> bool {
        let chars: Vec<char> = preprocess_text(text).chars().collect();
        if params.slices == 0 || chars.len() < params.slices {
            return false;
        }
        let width = chars.len().div_ceil(params.slices);

        let mut yes = 0;
        let mut no = 0;
        for piece in chars.chunks(width).take(params.slices) {
            let piece: String = piece.iter().collect();
            match self.model.predict(&piece) {
                Some(p) if p.confidence >= params.min_confidence && p.language() == target => yes += 1,
                Some(_) => no += 1,
                None => {}
            }
        }

        yes >= params.min_true && no <= params.max_false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Labels text "en" when it contains "the", "de" when it contains "der".
    struct KeywordModel;

    impl LanguageModel for KeywordModel {
        fn predict(&self, text: &str) -> Option<Prediction> {
            let (label, confidence) = if text.contains("the") {
                ("__label__en", 0.9)
            } else if text.contains("der") {
                ("__label__de", 0.9)
            } else if text.trim().is_empty() {
                return None;
            } else {
                ("__label__fr", 0.3)
            };
            Some(Prediction {
                label: label.to_string(),
                confidence,
            })
        }
    }

    #[test]
    fn test_preprocess_text() {
        assert_eq!(
            preprocess_text("<p>The  Cell-Cycle,\n revisited (2nd ed.)!</p>"),
            "the cellcycle, revisited nd ed.!"
        );
    }

    #[test]
    fn test_single_slice() {
        let detector = LanguageDetector::new(KeywordModel);
        let params = DetectionParams::default();
        assert!(detector.is_language("the quick brown fox", "en", &params));
        assert!(!detector.is_language("der schnelle fuchs", "en", &params));
        // low confidence counts against the target
        assert!(!detector.is_language("le renard", "en", &params));
    }

    #[test]
    fn test_slice_votes() {
        let detector = LanguageDetector::new(KeywordModel);
        let text = "the cat sat down der hund lief weg";
        let strict = DetectionParams {
            slices: 2,
            ..DetectionParams::default()
        };
        assert!(!detector.is_language(text, "en", &strict));

        let tolerant = DetectionParams {
            max_false: 1,
            ..strict
        };
        assert!(detector.is_language(text, "en", &tolerant));
    }

    /// Always labels "en"; confident only when the slice contains "the",
    /// undecided when it contains "zzz".
    struct ConfidenceModel;

    impl LanguageModel for ConfidenceModel {
        fn predict(&self, text: &str) -> Option<Prediction> {
            if text.contains("zzz") {
                return None;
            }
            let confidence = if text.contains("the") { 0.9 } else { 0.3 };
            Some(Prediction {
                label: "__label__en".to_string(),
                confidence,
            })
        }
    }

    #[test]
    fn test_low_confidence_slice_votes_against() {
        let detector = LanguageDetector::new(ConfidenceModel);
        let strict = DetectionParams {
            slices: 2,
            ..DetectionParams::default()
        };
        // "the fox ran " / "away and hid"
        assert!(!detector.is_language("the fox ran away and hid", "en", &strict));

        let tolerant = DetectionParams {
            max_false: 1,
            ..strict
        };
        assert!(detector.is_language("the fox ran away and hid", "en", &tolerant));

        // "the fox ran " / "away zzz zzz": undecided slice abstains
        assert!(detector.is_language("the fox ran away zzz zzz", "en", &strict));
    }

    #[test]
    fn test_text_shorter_than_slices() {
        let detector = LanguageDetector::new(KeywordModel);
        let params = DetectionParams {
            slices: 10,
            ..DetectionParams::default()
        };
        assert!(!detector.is_language("the", "en", &params));
    }
}
