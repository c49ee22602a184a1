use serde::Serialize;
use serde_json::json;
use tera::{Context, Error as TeraError, Tera};

use crate::agent::AgentMode;
use crate::models::tool::Tool;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TOKEN_SYSTEM_TEMPLATE: &str = include_str!("prompts/token_system.md");
const FOLLOW_UP_TEMPLATE: &str = include_str!("prompts/follow_up.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// The persona that seeds every conversation, listing what the model may invoke
pub fn system_prompt(mode: AgentMode, tools: &[Tool]) -> Result<String, TeraError> {
    let template = match mode {
        AgentMode::Structured => SYSTEM_TEMPLATE,
        AgentMode::Token => TOKEN_SYSTEM_TEMPLATE,
    };
    Ok(load_prompt(template, &json!({ "tools": tools }))?
        .trim()
        .to_string())
}

/// The user turn appended after a tool result so the model picks the question back up
pub fn follow_up_prompt(tool: &str, question: &str) -> Result<String, TeraError> {
    let rendered = load_prompt(
        FOLLOW_UP_TEMPLATE,
        &json!({ "tool": tool, "question": question }),
    )?;
    Ok(rendered.trim().to_string())
}
