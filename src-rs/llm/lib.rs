pub mod openai_adapter;
pub mod summarizer;
pub mod types;

pub use openai_adapter::{OpenAIAdapter, OpenAIConfig};
pub use summarizer::{build_summarizer, LlmSummarizer, MockSummarizer, Summarizer, MOCK_SUMMARY};
pub use types::{CompletionRequest, LLMResponse, Message, ProviderAdapter};
