//! Completion service clients for Parley.
//!
//! All clients implement the `parley_core::Provider` trait. The shipped
//! client speaks the OpenAI chat-completions protocol, which covers
//! OpenRouter, OpenAI, Ollama and most hosted gateways.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use parley_config::AppConfig;
use parley_core::error::ProviderError;

/// Build the configured completion client.
///
/// An explicit `api_url` wins over the named provider's default endpoint.
pub fn from_config(config: &AppConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();

    if api_key.is_empty() && config.provider != "ollama" {
        return Err(ProviderError::NotConfigured(format!(
            "no API key set for provider '{}'",
            config.provider
        )));
    }

    if let Some(url) = &config.api_url {
        return Ok(OpenAiCompatProvider::new(config.provider.clone(), url.clone(), api_key));
    }

    match config.provider.as_str() {
        "openrouter" => Ok(OpenAiCompatProvider::openrouter(api_key)),
        "openai" => Ok(OpenAiCompatProvider::openai(api_key)),
        "ollama" => Ok(OpenAiCompatProvider::ollama(None)),
        other => Err(ProviderError::NotConfigured(format!(
            "unknown provider '{other}' and no api_url configured"
        ))),
    }
}
