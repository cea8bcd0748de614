//! Retrieval-augmented answering: hits → prompt → generator → answer.
//!
//! Shared by `hrag ask` and `POST /chat`. Each request gets its own
//! [`PromptBuilder`] session.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use hybrid_rag_core::prompt::PromptBuilder;
use hybrid_rag_core::retrieval::Retrieved;

use crate::config::Config;
use crate::encoders::create_encoders;
use crate::generator::{create_generator, Generator};
use crate::search::search_index;
use crate::sqlite_store::SqliteStore;

/// A generated answer and the references it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Fresh session seeded with the configured system prompt.
pub fn new_session(config: &Config) -> PromptBuilder {
    PromptBuilder::new(Some(config.prompt.system_prompt().to_string()))
}

/// Add the retrieved contexts to `session` and render the prompt.
pub fn prepare_prompt(
    config: &Config,
    session: &mut PromptBuilder,
    query: &str,
    retrieved: &Retrieved,
) -> String {
    session.add_retrieved_context(retrieved.contexts.iter().cloned());
    session.build_prompt(
        query,
        config.retrieval.max_contexts,
        &config.prompt.format_requirement,
    )
}

/// Generate an answer for `query` from already retrieved material.
///
/// The exchange is appended to the session history.
pub async fn complete(
    config: &Config,
    session: &mut PromptBuilder,
    generator: &dyn Generator,
    query: &str,
    retrieved: &Retrieved,
) -> Result<ChatAnswer> {
    let prompt = prepare_prompt(config, session, query, retrieved);
    tracing::debug!(
        model = generator.model_name(),
        prompt_chars = prompt.chars().count(),
        "generating answer"
    );
    let answer = generator.generate(&prompt).await?;

    session.add_conversation("user", query);
    session.add_conversation("assistant", answer.clone());

    Ok(ChatAnswer {
        answer,
        sources: retrieved.sources.clone(),
    })
}

/// CLI entry point for `hrag ask`.
pub async fn run_ask(
    config: &Config,
    query: &str,
    image: Option<&Path>,
    prompt_only: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let encoders = create_encoders(&config.embedding)?;
    let adapter = encoders.adapter();
    let retrieved = search_index(config, &store, &adapter, query, image, None).await?;

    let mut session = new_session(config);
    if prompt_only {
        println!("{}", prepare_prompt(config, &mut session, query, &retrieved));
        return Ok(());
    }

    let generator = create_generator(&config.generator)?;
    let reply = complete(config, &mut session, generator.as_ref(), query, &retrieved).await?;
    println!("{}", session.format_answer(&reply.answer, &reply.sources));
    Ok(())
}
