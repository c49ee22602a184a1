use super::{
    base::Provider, configs::ProviderConfig, gemini::GeminiProvider, openai::OpenAiProvider,
};
use anyhow::Result;
use serde::Deserialize;
use strum_macros::{Display, EnumIter};

#[derive(EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    Gemini,
    OpenAi,
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::Gemini(gemini_config) => Ok(Box::new(GeminiProvider::new(gemini_config)?)),
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
    }
}
