//! Partition chunks into embedding batches under a token ceiling.
//!
//! A batch holds at most `max_input_tokens / chunk_size` chunks and additionally closes early
//! when the next chunk would push its token count past `max_input_tokens`. Token counts use
//! `tiktoken-rs` for known OpenAI models and encodings; unknown models (typical for Ollama)
//! fall back to whitespace counting.

use super::types::Chunk;
use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Counts tokens in a text segment.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// A contiguous run of chunks sharing one embedding request.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Run-wide index of the first chunk; record ids are `offset + position in batch`.
    pub offset: u64,
    /// Chunks in dispatch order.
    pub chunks: Vec<Chunk>,
}

impl Batch {
    /// Number of chunks in the batch.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the batch holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Split `chunks` into ordered batches.
///
/// Every batch holds at least one chunk, so a single chunk larger than `token_ceiling` still
/// travels alone rather than being dropped.
pub fn plan_batches(
    chunks: Vec<Chunk>,
    max_chunks: usize,
    token_ceiling: usize,
    counter: &TokenCounter,
) -> Vec<Batch> {
    let max_chunks = max_chunks.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<Chunk> = Vec::with_capacity(max_chunks);
    let mut current_tokens = 0usize;
    let mut offset = 0u64;

    for chunk in chunks {
        let tokens = counter.as_ref()(&chunk.text);
        let full = current.len() >= max_chunks;
        let over_budget = !current.is_empty() && current_tokens + tokens > token_ceiling;
        if full || over_budget {
            let len = current.len() as u64;
            batches.push(Batch {
                offset,
                chunks: std::mem::take(&mut current),
            });
            offset += len;
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(chunk);
    }

    if !current.is_empty() {
        batches.push(Batch {
            offset,
            chunks: current,
        });
    }
    batches
}

/// Build a token counter for the embedding model, falling back to whitespace counting.
pub fn build_token_counter(model: &str) -> TokenCounter {
    match build_tiktoken_counter(model) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

/// Counts whitespace-separated words; non-empty text always counts as at least one token.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, TokenizerError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = Arc::new(resolve_encoding(target)?);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(position, text)| Chunk {
                text: (*text).to_string(),
                source: "doc.pdf".into(),
                position,
            })
            .collect()
    }

    #[test]
    fn batches_respect_chunk_count_and_offsets() {
        let counter = whitespace_token_counter();
        let batches = plan_batches(
            chunks(&["a", "b", "c", "d", "e", "f", "g"]),
            3,
            1_000,
            &counter,
        );
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        let offsets: Vec<u64> = batches.iter().map(|batch| batch.offset).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn batches_close_early_at_token_ceiling() {
        let counter = whitespace_token_counter();
        let batches = plan_batches(
            chunks(&["one two three", "four five", "six", "seven eight nine ten"]),
            10,
            5,
            &counter,
        );
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2]);
        assert_eq!(batches[1].offset, 2);
    }

    #[test]
    fn oversized_chunk_travels_alone() {
        let counter = whitespace_token_counter();
        let batches = plan_batches(chunks(&["a b c d e f", "g"]), 10, 3, &counter);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![1, 1]);
    }

    #[test]
    fn empty_input_plans_no_batches() {
        let counter = whitespace_token_counter();
        assert!(plan_batches(Vec::new(), 4, 100, &counter).is_empty());
    }

    #[test]
    fn whitespace_counter_counts_symbols_as_one() {
        let counter = whitespace_token_counter();
        assert_eq!(counter.as_ref()("one two"), 2);
        assert_eq!(counter.as_ref()("   "), 1);
        assert_eq!(counter.as_ref()(""), 0);
    }

    #[test]
    fn tiktoken_counter_handles_known_models() {
        let counter = build_token_counter("text-embedding-3-small");
        let tokens = counter.as_ref()("The quick brown fox jumps over the lazy dog.");
        assert!(tokens > 0 && tokens < 20);
    }
}
