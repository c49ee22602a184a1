//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - conversation messages, stored by the agent as plain text with a role
//! - wire contents, the two-role history that model APIs accept
//! - gemini and openai requests/responses, sent between the agent and the LLM
//! - tool provider requests, sent between the agent and the process serving tools
//!
//! We always immediately convert those formats into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
pub mod wire;
