//! Local text and image encoders.
//!
//! With the `local-embeddings-fastembed` feature (default), text is
//! embedded by a fastembed sentence model and images by a fastembed vision
//! model (CLIP ViT-B/32 by default). Models are downloaded on first use and
//! run fully offline afterwards.
//!
//! fastembed models need `&mut self` to embed, so each model sits behind a
//! `Mutex`. Inference is blocking; async callers go through
//! `tokio::task::spawn_blocking` (see [`crate::server`]).
//!
//! | Config `embedding.provider` | Behavior |
//! |-----------------------------|----------|
//! | `"local"` | fastembed text + image models |
//! | `"disabled"` | [`create_encoders`] fails; indexing and search are unavailable |

use anyhow::{bail, Result};
use std::sync::Arc;

use hybrid_rag_core::embedding::{EncoderAdapter, ImageEncoder, TextEncoder};

use crate::config::EmbeddingConfig;

/// A text and an image encoder, shareable across tasks.
#[derive(Clone)]
pub struct Encoders {
    pub text: Arc<dyn TextEncoder>,
    pub image: Arc<dyn ImageEncoder>,
}

impl Encoders {
    pub fn new(text: Arc<dyn TextEncoder>, image: Arc<dyn ImageEncoder>) -> Self {
        Self { text, image }
    }

    /// Borrowing adapter over both encoders.
    pub fn adapter(&self) -> EncoderAdapter<'_> {
        EncoderAdapter::new(self.text.as_ref(), self.image.as_ref())
    }
}

/// Build the encoders named in the configuration.
///
/// # Errors
///
/// Fails if the provider is disabled, unknown, or not compiled in, if a
/// model name is not recognised, or if a model cannot be loaded.
pub fn create_encoders(config: &EmbeddingConfig) -> Result<Encoders> {
    if !config.is_enabled() {
        bail!(
            "Embedding provider is disabled; set embedding.provider = \"local\" to index or search"
        );
    }
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => {
            let text = local::FastembedText::new(&config.text_model, config.text_dims)?;
            let image = local::FastembedImage::new(&config.image_model, config.image_dims)?;
            Ok(Encoders::new(Arc::new(text), Arc::new(image)))
        }
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use anyhow::{anyhow, bail, Result};
    use std::path::Path;
    use std::sync::Mutex;

    use fastembed::{
        EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
        TextEmbedding,
    };
    use hybrid_rag_core::embedding::{ImageEncoder, TextEncoder};

    pub(super) fn text_model(name: &str) -> Result<EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
            "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
            "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            other => bail!(
                "Unknown text model: '{}'. Supported: all-minilm-l6-v2, bge-small-en-v1.5, \
                 bge-base-en-v1.5, bge-large-en-v1.5, multilingual-e5-small, \
                 multilingual-e5-base, nomic-embed-text-v1.5",
                other
            ),
        }
    }

    pub(super) fn image_model(name: &str) -> Result<ImageEmbeddingModel> {
        match name {
            "clip-vit-b-32" => Ok(ImageEmbeddingModel::ClipVitB32),
            "resnet50" => Ok(ImageEmbeddingModel::Resnet50),
            "unicom-vit-b-16" => Ok(ImageEmbeddingModel::UnicomVitB16),
            "unicom-vit-b-32" => Ok(ImageEmbeddingModel::UnicomVitB32),
            other => bail!(
                "Unknown image model: '{}'. Supported: clip-vit-b-32, resnet50, \
                 unicom-vit-b-16, unicom-vit-b-32",
                other
            ),
        }
    }

    pub struct FastembedText {
        name: String,
        dims: usize,
        model: Mutex<TextEmbedding>,
    }

    impl FastembedText {
        pub fn new(name: &str, dims: usize) -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(text_model(name)?).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize text model {}: {}", name, e))?;
            Ok(Self {
                name: name.to_string(),
                dims,
                model: Mutex::new(model),
            })
        }
    }

    impl TextEncoder for FastembedText {
        fn model_name(&self) -> &str {
            &self.name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow!("text model lock poisoned"))?;
            model
                .embed(vec![text], None)
                .map_err(|e| anyhow!("Local text embedding failed: {}", e))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Empty embedding response"))
        }
    }

    pub struct FastembedImage {
        name: String,
        dims: usize,
        model: Mutex<ImageEmbedding>,
    }

    impl FastembedImage {
        pub fn new(name: &str, dims: usize) -> Result<Self> {
            let model = ImageEmbedding::try_new(
                ImageInitOptions::new(image_model(name)?).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize image model {}: {}", name, e))?;
            Ok(Self {
                name: name.to_string(),
                dims,
                model: Mutex::new(model),
            })
        }
    }

    impl ImageEncoder for FastembedImage {
        fn model_name(&self) -> &str {
            &self.name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow!("image model lock poisoned"))?;
            model
                .embed(vec![path], None)
                .map_err(|e| anyhow!("Local image embedding failed: {}", e))?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("Empty embedding response"))
        }
    }
}
