//! Worldforge: concrete generation collaborators.
//!
//! Implements the generation ports of `worldforge-worlds`: a `minijinja`
//! prompt renderer fed from a YAML template catalog, an OpenAI-compatible
//! chat completions client, and a credentials provider built from
//! configuration.

pub mod credentials;
pub mod error;
pub mod openai;
pub mod prompts;

pub use credentials::StaticCredentialsProvider;
pub use error::SetupError;
pub use openai::OpenAiCompatibleGenerator;
pub use prompts::MiniJinjaPromptRenderer;
