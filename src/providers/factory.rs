// Provider factory
//
// Creates backend adapters from descriptors

use anyhow::{Context, Result};
use std::sync::Arc;

use super::llamacpp::LlamaCppProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiCompatProvider;
use super::types::{AdapterOptions, BackendDescriptor, BackendKind};
use super::LlmProvider;

/// Create the adapter matching `descriptor.kind`.
pub fn create_provider(
    descriptor: &BackendDescriptor,
    options: &AdapterOptions,
) -> Result<Arc<dyn LlmProvider>> {
    let name = descriptor.display_name();
    let provider: Arc<dyn LlmProvider> = match descriptor.kind {
        BackendKind::Ollama => Arc::new(OllamaProvider::new(descriptor.clone(), *options)?),
        BackendKind::OpenAiCompatible => {
            Arc::new(OpenAiCompatProvider::new(descriptor.clone(), *options)?)
        }
        BackendKind::LlamaCpp => Arc::new(LlamaCppProvider::new(descriptor.clone(), *options)?),
    };
    tracing::debug!("Created provider {}", name);
    Ok(provider)
}

/// Create adapters for every descriptor, ordered by priority.
pub fn create_providers(
    descriptors: &[BackendDescriptor],
    options: &AdapterOptions,
) -> Result<Vec<Arc<dyn LlmProvider>>> {
    let mut sorted: Vec<&BackendDescriptor> = descriptors.iter().collect();
    sorted.sort_by_key(|d| d.priority);

    sorted
        .into_iter()
        .map(|d| {
            create_provider(d, options)
                .with_context(|| format!("Failed to create provider {}", d.display_name()))
        })
        .collect()
}
