use anyhow::Result;
use indoc::indoc;

pub mod rustyline;

pub const EXIT_WORDS: [&str; 4] = ["quit", "exit", "bye", "q"];

pub const HELP: &str = indoc! {"
    Commands:
    quit | exit | bye | q - End the session
    /clear - Forget the conversation so far
    /help - Display this help message
    Anything else is sent to the assistant as a question.
"};

pub trait Prompt {
    fn render(&mut self, answer: &str);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn ready(&self) {
        println!("\nAsk a question about your database. Type /help for commands.\n");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

impl Input {
    fn control(input_type: InputType) -> Self {
        Self {
            input_type,
            content: None,
        }
    }

    /// Classify one line typed by the user
    pub fn parse(line: &str) -> Self {
        let text = line.trim();
        if text.is_empty() {
            return Self::control(InputType::AskAgain);
        }
        if EXIT_WORDS.iter().any(|word| text.eq_ignore_ascii_case(word)) {
            return Self::control(InputType::Exit);
        }
        if text.eq_ignore_ascii_case("/clear") {
            return Self::control(InputType::Clear);
        }
        if text.eq_ignore_ascii_case("/help") || text == "/?" {
            return Self::control(InputType::Help);
        }
        Self {
            input_type: InputType::Message,
            content: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    AskAgain, // Nothing to do, read again
    Message,  // A question for the assistant
    Clear,    // Reset the conversation
    Help,     // Show the command list
    Exit,     // Leave the loop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        for word in ["quit", "EXIT", " bye ", "Q"] {
            assert_eq!(Input::parse(word).input_type, InputType::Exit);
        }
        // Only the bare word ends the session
        assert_eq!(
            Input::parse("quit using the old table").input_type,
            InputType::Message
        );
    }

    #[test]
    fn test_commands() {
        assert_eq!(Input::parse("/clear").input_type, InputType::Clear);
        assert_eq!(Input::parse("/HELP").input_type, InputType::Help);
        assert_eq!(Input::parse("/?").input_type, InputType::Help);
        assert_eq!(Input::parse("   ").input_type, InputType::AskAgain);
    }

    #[test]
    fn test_message_is_trimmed() {
        let input = Input::parse("  how many users signed up today?\n");
        assert_eq!(input.input_type, InputType::Message);
        assert_eq!(
            input.content.as_deref(),
            Some("how many users signed up today?")
        );
    }
}
