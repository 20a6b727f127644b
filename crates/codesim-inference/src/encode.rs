//! Pair tokenization on a bounded worker pool.

use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPool;
use tokenizers::{Tokenizer, TruncationParams};

use crate::data::CodePairExample;
use crate::error::{InferenceError, InferenceResult};

/// Token ids of both snippets of one pair, unpadded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPair {
    pub ids_a: Vec<u32>,
    pub ids_b: Vec<u32>,
}

/// Tokenizes each snippet of a pair independently, truncated to
/// `max_length` tokens including special tokens.
pub struct PairEncoder {
    tokenizer: Tokenizer,
    max_length: usize,
    pool: ThreadPool,
}

impl std::fmt::Debug for PairEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairEncoder")
            .field("max_length", &self.max_length)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

impl PairEncoder {
    /// Load `tokenizer.json` and build a pool of `workers` threads.
    pub fn from_file(path: &Path, max_length: usize, workers: usize) -> InferenceResult<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| InferenceError::TokenizationError {
            message: format!("failed to load tokenizer '{}': {}", path.display(), e),
        })?;
        Self::new(tokenizer, max_length, workers)
    }

    pub fn new(mut tokenizer: Tokenizer, max_length: usize, workers: usize) -> InferenceResult<Self> {
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::TokenizationError {
                message: format!("invalid truncation length {}: {}", max_length, e),
            })?;
        tokenizer.with_padding(None);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("codesim-tokenize-{}", i))
            .build()
            .map_err(|e| InferenceError::config(format!("failed to build tokenizer pool: {}", e)))?;

        Ok(Self {
            tokenizer,
            max_length,
            pool,
        })
    }

    /// Id of `token` in the vocabulary.
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Tokenize one snippet.
    pub fn encode_one(&self, code: &str) -> InferenceResult<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(code, true)
            .map_err(|e| InferenceError::TokenizationError {
                message: e.to_string(),
            })?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Tokenize every pair in parallel. Output order matches input order.
    pub fn encode_all(&self, examples: &[CodePairExample]) -> InferenceResult<Vec<EncodedPair>> {
        let encoded: InferenceResult<Vec<EncodedPair>> = self.pool.install(|| {
            examples
                .par_iter()
                .map(|example| {
                    let ids_a = self.encode_one(&example.code1).map_err(|e| at_row(e, example.row))?;
                    let ids_b = self.encode_one(&example.code2).map_err(|e| at_row(e, example.row))?;
                    Ok(EncodedPair { ids_a, ids_b })
                })
                .collect()
        });
        let encoded = encoded?;

        let truncated = encoded
            .iter()
            .filter(|p| p.ids_a.len() == self.max_length || p.ids_b.len() == self.max_length)
            .count();
        tracing::info!(
            pairs = encoded.len(),
            workers = self.pool.current_num_threads(),
            at_max_length = truncated,
            "Pairs tokenized"
        );

        Ok(encoded)
    }
}

fn at_row(err: InferenceError, row: usize) -> InferenceError {
    match err {
        InferenceError::TokenizationError { message } => InferenceError::TokenizationError {
            message: format!("row {}: {}", row, message),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "RobertaProcessing",
            "sep": ["</s>", 2],
            "cls": ["<s>", 0],
            "trim_offsets": true,
            "add_prefix_space": false
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "<s>": 0, "<pad>": 1, "</s>": 2, "<unk>": 3, "a": 4, "b": 5, "c": 6 },
            "unk_token": "<unk>"
        }
    }"#;

    fn encoder(max_length: usize, workers: usize) -> PairEncoder {
        let tokenizer: Tokenizer = TOKENIZER.parse().unwrap();
        PairEncoder::new(tokenizer, max_length, workers).unwrap()
    }

    fn example(row: usize, code1: &str, code2: &str) -> CodePairExample {
        CodePairExample {
            row,
            id: None,
            code1: code1.to_string(),
            code2: code2.to_string(),
            label: None,
        }
    }

    #[test]
    fn test_adds_specials_and_maps_unknown() {
        let enc = encoder(16, 1);
        assert_eq!(enc.encode_one("a b zzz").unwrap(), vec![0, 4, 5, 3, 2]);
        assert_eq!(enc.token_id("<pad>"), Some(1));
    }

    #[test]
    fn test_truncates_to_max_length() {
        let enc = encoder(4, 1);
        let ids = enc.encode_one("a b c a b c").unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids.first(), Some(&0));
        assert_eq!(ids.last(), Some(&2));
    }

    #[test]
    fn test_parallel_encoding_preserves_order() {
        let enc = encoder(16, 4);
        let words = ["a", "b", "c"];
        let examples: Vec<_> = (0..200)
            .map(|i| {
                let code1 = vec![words[i % 3]; 1 + i % 5].join(" ");
                example(i, &code1, words[(i + 1) % 3])
            })
            .collect();

        let encoded = enc.encode_all(&examples).unwrap();
        assert_eq!(encoded.len(), examples.len());
        for (i, pair) in encoded.iter().enumerate() {
            assert_eq!(pair.ids_a.len(), 1 + i % 5 + 2);
            assert_eq!(pair.ids_a[1], 4 + (i % 3) as u32);
            assert_eq!(pair.ids_b[1], 4 + ((i + 1) % 3) as u32);
        }
    }
}
