//! OpenCLIP text tokenization and token-embedding lookup for text conditioning

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Module};
use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

use crate::config::TextOptions;
use crate::error::{Error, Result};

const COMMA_TOKEN: &str = ",</w>";
const START_TOKENS: [&str; 2] = ["<start_of_text>", "<|startoftext|>"];
const END_TOKENS: [&str; 2] = ["<end_of_text>", "<|endoftext|>"];
const PAD_ID: u32 = 0;

/// Key of the token embedding table in OpenCLIP checkpoints
pub const TOKEN_EMBEDDING_KEY: &str = "token_embedding.weight";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub comma_id: u32,
    pub start_id: u32,
    pub end_id: u32,
    pub pad_id: u32,
}

/// OpenCLIP vocabulary backed by a `tokenizers` tokenizer
pub struct OpenClipVocab {
    inner: HfTokenizer,
    special_tokens: SpecialTokens,
}

impl OpenClipVocab {
    pub fn new(inner: HfTokenizer) -> Result<Self> {
        let comma_id = inner.token_to_id(COMMA_TOKEN).ok_or_else(|| {
            Error::TokenizationError(format!("vocabulary has no {} token", COMMA_TOKEN))
        })?;
        let start_id = lookup_any(&inner, &START_TOKENS)?;
        let end_id = lookup_any(&inner, &END_TOKENS)?;

        Ok(Self {
            inner,
            special_tokens: SpecialTokens {
                comma_id,
                start_id,
                end_id,
                pad_id: PAD_ID,
            },
        })
    }

    /// Load from a `tokenizer.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner =
            HfTokenizer::from_file(path).map_err(|e| Error::TokenizationError(e.to_string()))?;
        debug!("Loaded tokenizer from {:?}", path);
        Self::new(inner)
    }

    /// Load from the JSON text of a `tokenizer.json` file
    pub fn from_json(json: &str) -> Result<Self> {
        let inner =
            HfTokenizer::from_str(json).map_err(|e| Error::TokenizationError(e.to_string()))?;
        Self::new(inner)
    }

    /// Token ids of `text` without start/end markers
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| Error::TokenizationError(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Token ids for each text, encoded independently. Fails before encoding
    /// anything when the legacy emphasis parser is enabled.
    pub fn tokenize<S: AsRef<str>>(
        &self,
        texts: &[S],
        options: &TextOptions,
    ) -> Result<Vec<Vec<u32>>> {
        ensure_emphasis_compatible(options)?;

        texts.iter().map(|text| self.encode(text.as_ref())).collect()
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }
}

fn lookup_any(tokenizer: &HfTokenizer, candidates: &[&str]) -> Result<u32> {
    candidates
        .iter()
        .find_map(|token| tokenizer.token_to_id(token))
        .ok_or_else(|| {
            Error::TokenizationError(format!("vocabulary has none of {:?}", candidates))
        })
}

/// The legacy emphasis parser numbers tokens differently from OpenCLIP.
pub fn ensure_emphasis_compatible(options: &TextOptions) -> Result<()> {
    if options.use_old_emphasis_implementation {
        return Err(Error::IncompatibleEmphasis);
    }
    Ok(())
}

/// Text encoder wrapped by [`OpenClipEmbedder`]
pub trait ConditioningModel {
    /// Run the transformer over a `[batch, seq]` tensor of token ids
    fn encode_with_transformer(&self, tokens: &Tensor) -> candle_core::Result<Tensor>;

    /// Token embedding table of the text encoder
    fn token_embedding(&self) -> &Embedding;
}

/// Token embedding table on its own, for embedding lookups without the
/// transformer weights
pub struct EmbeddingTable {
    embedding: Embedding,
}

impl EmbeddingTable {
    pub fn new(embedding: Embedding) -> Self {
        Self { embedding }
    }

    /// Load the `[vocab, dim]` table stored under `key` in a safetensors file
    pub fn from_safetensors(path: &Path, key: &str, device: &Device) -> Result<Self> {
        let mut tensors: HashMap<String, Tensor> = candle_core::safetensors::load(path, device)?;
        let weights = tensors.remove(key).ok_or_else(|| {
            Error::ConfigError(format!("{} not found in {}", key, path.display()))
        })?;
        let hidden_size = weights.dim(1)?;
        debug!(
            "Loaded token embedding {:?} from {}",
            weights.shape(),
            path.display()
        );
        Ok(Self::new(Embedding::new(weights, hidden_size)))
    }
}

impl ConditioningModel for EmbeddingTable {
    fn encode_with_transformer(&self, _tokens: &Tensor) -> candle_core::Result<Tensor> {
        candle_core::bail!("transformer weights are not loaded")
    }

    fn token_embedding(&self) -> &Embedding {
        &self.embedding
    }
}

/// OpenCLIP tokenizer adapter for the text conditioning pipeline
pub struct OpenClipEmbedder<M> {
    vocab: OpenClipVocab,
    model: M,
    device: Device,
    options: TextOptions,
}

impl<M: ConditioningModel> OpenClipEmbedder<M> {
    pub fn new(vocab: OpenClipVocab, model: M, device: Device, options: TextOptions) -> Self {
        Self {
            vocab,
            model,
            device,
            options,
        }
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        self.vocab.special_tokens()
    }

    pub fn vocab(&self) -> &OpenClipVocab {
        &self.vocab
    }

    pub fn set_options(&mut self, options: TextOptions) {
        self.options = options;
    }

    pub fn tokenize<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<u32>>> {
        self.vocab.tokenize(texts, &self.options)
    }

    pub fn encode_with_transformers(&self, tokens: &Tensor) -> Result<Tensor> {
        Ok(self.model.encode_with_transformer(tokens)?)
    }

    /// Embedding rows for the tokens of `init_text`, shape `[tokens, dim]`.
    ///
    /// `_vectors_per_token` is accepted for interface parity with the CLIP
    /// embedder and does not change the result.
    pub fn encode_embedding_init_text(
        &self,
        init_text: &str,
        _vectors_per_token: usize,
    ) -> Result<Tensor> {
        let ids = self.vocab.encode(init_text)?;
        let ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let embedded = self.model.token_embedding().forward(&ids)?;
        Ok(embedded.squeeze(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    const VOCAB_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<unk>": 0,
                "<start_of_text>": 1,
                "<end_of_text>": 2,
                ",</w>": 3,
                "a": 4,
                "cat": 5,
                "photo": 6,
                "of": 7
            },
            "unk_token": "<unk>"
        }
    }"#;

    struct DoublingModel {
        embedding: Embedding,
    }

    impl DoublingModel {
        fn new() -> Self {
            let weights = Tensor::arange(0f32, 32f32, &Device::Cpu)
                .unwrap()
                .reshape((8, 4))
                .unwrap();
            Self {
                embedding: Embedding::new(weights, 4),
            }
        }
    }

    impl ConditioningModel for DoublingModel {
        fn encode_with_transformer(&self, tokens: &Tensor) -> candle_core::Result<Tensor> {
            tokens.to_dtype(DType::F32)?.affine(2.0, 0.0)
        }

        fn token_embedding(&self) -> &Embedding {
            &self.embedding
        }
    }

    fn embedder(options: TextOptions) -> OpenClipEmbedder<DoublingModel> {
        let vocab = OpenClipVocab::from_json(VOCAB_JSON).unwrap();
        OpenClipEmbedder::new(vocab, DoublingModel::new(), Device::Cpu, options)
    }

    fn legacy_emphasis() -> TextOptions {
        TextOptions {
            use_old_emphasis_implementation: true,
        }
    }

    #[test]
    fn special_tokens_resolved_from_vocabulary() {
        let embedder = embedder(TextOptions::default());
        assert_eq!(
            *embedder.special_tokens(),
            SpecialTokens {
                comma_id: 3,
                start_id: 1,
                end_id: 2,
                pad_id: 0,
            }
        );
    }

    #[test]
    fn missing_comma_token_is_an_error() {
        let json = VOCAB_JSON.replace(",</w>", "comma");
        assert!(matches!(
            OpenClipVocab::from_json(&json),
            Err(Error::TokenizationError(_))
        ));
    }

    #[test]
    fn hf_style_markers_are_accepted() {
        let json = VOCAB_JSON
            .replace("<start_of_text>", "<|startoftext|>")
            .replace("<end_of_text>", "<|endoftext|>");
        let vocab = OpenClipVocab::from_json(&json).unwrap();
        assert_eq!(vocab.special_tokens().start_id, 1);
        assert_eq!(vocab.special_tokens().end_id, 2);
    }

    #[test]
    fn tokenize_encodes_each_text_without_markers() {
        let embedder = embedder(TextOptions::default());
        let tokens = embedder.tokenize(&["a cat", "photo of a cat"]).unwrap();
        assert_eq!(tokens, vec![vec![4, 5], vec![6, 7, 4, 5]]);
    }

    #[test]
    fn tokenize_rejects_legacy_emphasis() {
        let embedder = embedder(legacy_emphasis());
        assert!(matches!(
            embedder.tokenize(&["a cat"]),
            Err(Error::IncompatibleEmphasis)
        ));
    }

    #[test]
    fn vocab_tokenize_matches_embedder() {
        let vocab = OpenClipVocab::from_json(VOCAB_JSON).unwrap();
        let texts = ["photo of a cat", "a"];
        assert_eq!(
            vocab.tokenize(&texts, &TextOptions::default()).unwrap(),
            embedder(TextOptions::default()).tokenize(&texts).unwrap()
        );
        assert!(matches!(
            vocab.tokenize(&[] as &[&str], &legacy_emphasis()),
            Err(Error::IncompatibleEmphasis)
        ));
    }

    #[test]
    fn options_can_be_switched_at_runtime() {
        let mut embedder = embedder(TextOptions::default());
        assert!(embedder.tokenize(&["a"]).is_ok());
        embedder.set_options(legacy_emphasis());
        assert!(embedder.tokenize(&["a"]).is_err());
    }

    #[test]
    fn encode_with_transformers_delegates() {
        let embedder = embedder(TextOptions::default());
        let tokens = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        let encoded = embedder.encode_with_transformers(&tokens).unwrap();
        assert_eq!(encoded.to_vec2::<f32>().unwrap(), vec![vec![2.0, 4.0, 6.0]]);
    }

    #[test]
    fn init_text_embedding_has_one_row_per_token() {
        let embedder = embedder(TextOptions::default());
        let embedded = embedder.encode_embedding_init_text("a cat", 1).unwrap();

        assert_eq!(embedded.dims(), &[2, 4]);
        assert_eq!(
            embedded.to_vec2::<f32>().unwrap(),
            vec![
                vec![16.0, 17.0, 18.0, 19.0],
                vec![20.0, 21.0, 22.0, 23.0],
            ]
        );
    }

    #[test]
    fn embedding_table_has_no_transformer() {
        let table = EmbeddingTable::new(DoublingModel::new().embedding);
        let tokens = Tensor::new(&[[1u32]], &Device::Cpu).unwrap();
        assert!(table.encode_with_transformer(&tokens).is_err());
    }

    #[test]
    fn embedding_table_loads_from_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.safetensors");
        let weights = Tensor::arange(0f32, 32f32, &Device::Cpu)
            .unwrap()
            .reshape((8, 4))
            .unwrap();
        candle_core::safetensors::save(
            &HashMap::from([(TOKEN_EMBEDDING_KEY.to_string(), weights)]),
            &path,
        )
        .unwrap();

        let table = EmbeddingTable::from_safetensors(&path, TOKEN_EMBEDDING_KEY, &Device::Cpu)
            .unwrap();
        assert_eq!(table.token_embedding().embeddings().dims(), &[8, 4]);
        assert!(matches!(
            EmbeddingTable::from_safetensors(&path, "missing", &Device::Cpu),
            Err(Error::ConfigError(_))
        ));
    }
}
