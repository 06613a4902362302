//! Batching of source strings into bounded provider calls.

use serde::{Deserialize, Serialize};

/// Upper bounds for a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum number of texts per batch
    pub max_items: usize,
    /// Maximum cumulative character count per batch
    pub max_chars: usize,
}

impl BatchLimits {
    pub fn new(max_items: usize, max_chars: usize) -> Self {
        Self {
            max_items,
            max_chars,
        }
    }

    /// Limit by item count only.
    pub fn items(max_items: usize) -> Self {
        Self::new(max_items, usize::MAX)
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::new(20, 4000)
    }
}

/// An ordered list of source strings to translate, with its batch constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    texts: Vec<String>,
    limits: BatchLimits,
}

impl TranslationRequest {
    pub fn new(texts: Vec<String>, limits: BatchLimits) -> Self {
        Self { texts, limits }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn batches(&self) -> Vec<Batch<'_>> {
        create_batches(&self.texts, self.limits)
    }
}

/// A contiguous slice of a request, remembering where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Index of the first text within the original request
    pub offset: usize,
    pub texts: &'a [String],
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Total characters in this batch
    pub fn char_count(&self) -> usize {
        char_len_sum(self.texts)
    }
}

/// Sum of character (not byte) lengths.
pub fn char_len_sum(texts: &[String]) -> usize {
    texts.iter().map(|t| t.chars().count()).sum()
}

/// Greedily split `texts` into batches bounded by item count and characters.
///
/// A batch is closed as soon as adding the next text would exceed either
/// limit. A text that alone exceeds `max_chars` gets a batch of its own.
/// The concatenation of all batches is always the input, in order.
pub fn create_batches(texts: &[String], limits: BatchLimits) -> Vec<Batch<'_>> {
    let max_items = limits.max_items.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut chars = 0usize;

    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let count = i - start;
        let over_items = count + 1 > max_items;
        let over_chars = chars.saturating_add(len) > limits.max_chars;

        if count > 0 && (over_items || over_chars) {
            batches.push(Batch {
                offset: start,
                texts: &texts[start..i],
            });
            start = i;
            chars = 0;
        }
        chars = chars.saturating_add(len);
    }

    if start < texts.len() {
        batches.push(Batch {
            offset: start,
            texts: &texts[start..],
        });
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn as_vecs(batches: &[Batch<'_>]) -> Vec<Vec<String>> {
        batches.iter().map(|b| b.texts.to_vec()).collect()
    }

    // ==================== create_batches Tests ====================

    #[test]
    fn test_batches_by_item_count() {
        let texts = strings(&["a", "b", "c", "d", "e"]);
        let batches = create_batches(&texts, BatchLimits::items(2));

        assert_eq!(
            as_vecs(&batches),
            vec![
                strings(&["a", "b"]),
                strings(&["c", "d"]),
                strings(&["e"])
            ]
        );
        assert_eq!(batches[0].offset, 0);
        assert_eq!(batches[1].offset, 2);
        assert_eq!(batches[2].offset, 4);
    }

    #[test]
    fn test_batches_by_char_limit() {
        let texts = strings(&["aaaa", "bbbb", "cc", "d"]);
        let batches = create_batches(&texts, BatchLimits::new(10, 6));

        assert_eq!(
            as_vecs(&batches),
            vec![strings(&["aaaa"]), strings(&["bbbb", "cc"]), strings(&["d"])]
        );
    }

    #[test]
    fn test_oversized_item_gets_own_batch() {
        let texts = strings(&["ab", "this one is far too long", "cd"]);
        let batches = create_batches(&texts, BatchLimits::new(10, 5));

        assert_eq!(
            as_vecs(&batches),
            vec![
                strings(&["ab"]),
                strings(&["this one is far too long"]),
                strings(&["cd"])
            ]
        );
    }

    #[test]
    fn test_char_limit_counts_characters_not_bytes() {
        // 4 Hangul characters are 12 bytes
        let texts = strings(&["한국어로", "번역"]);
        let batches = create_batches(&texts, BatchLimits::new(10, 6));
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let texts: Vec<String> = vec![];
        assert!(create_batches(&texts, BatchLimits::default()).is_empty());
    }

    #[test]
    fn test_zero_max_items_treated_as_one() {
        let texts = strings(&["a", "b"]);
        let batches = create_batches(&texts, BatchLimits::items(0));
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_batch_char_count() {
        let texts = strings(&["abc", "de"]);
        let batches = create_batches(&texts, BatchLimits::default());
        assert_eq!(batches[0].char_count(), 5);
    }

    #[test]
    fn test_request_batches_are_deterministic() {
        let request = TranslationRequest::new(
            strings(&["one", "two", "three", "four"]),
            BatchLimits::new(3, 8),
        );
        assert_eq!(as_vecs(&request.batches()), as_vecs(&request.batches()));
        assert_eq!(request.len(), 4);
    }

    // ==================== Properties ====================

    proptest! {
        #[test]
        fn prop_batches_concatenate_to_input(
            texts in prop::collection::vec(".{0,30}", 0..40),
            max_items in 1usize..8,
            max_chars in 1usize..80,
        ) {
            let batches = create_batches(&texts, BatchLimits::new(max_items, max_chars));
            let joined: Vec<String> = batches.iter().flat_map(|b| b.texts.iter().cloned()).collect();
            prop_assert_eq!(joined, texts.clone());

            let mut expected_offset = 0;
            for batch in &batches {
                prop_assert_eq!(batch.offset, expected_offset);
                expected_offset += batch.len();
            }
        }

        #[test]
        fn prop_batches_respect_limits_unless_single_item(
            texts in prop::collection::vec(".{0,30}", 1..40),
            max_items in 1usize..8,
            max_chars in 1usize..80,
        ) {
            let batches = create_batches(&texts, BatchLimits::new(max_items, max_chars));
            for batch in &batches {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= max_items);
                if batch.len() > 1 {
                    prop_assert!(batch.char_count() <= max_chars);
                }
            }
        }
    }
}
