use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::{Input, InputType, Prompt, HELP};

const PROMPT: &str = "Query: ";
const THEME: &str = "zenburn";

pub struct RustylinePrompt {
    editor: DefaultEditor,
    spinner: cliclack::ProgressBar,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            editor: DefaultEditor::new()?,
            spinner: spinner(),
        })
    }
}

fn print_markdown(content: &str) {
    let printed = bat::PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .theme(THEME)
        .language("markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    // Plain output when the terminal cannot be highlighted
    if printed.is_err() {
        println!("{}", content);
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, answer: &str) {
        if answer.starts_with("❌") {
            println!("{}", style(answer).red());
        } else {
            print_markdown(answer);
        }
        println!();
        let _ = io::stdout().flush();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("Querying the database...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let line = match self.editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Ok(Input {
                    input_type: InputType::Exit,
                    content: None,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let input = Input::parse(&line);
        match input.input_type {
            InputType::Message => {
                let _ = self.editor.add_history_entry(line.trim());
            }
            InputType::Help => print!("{}", style(HELP).dim()),
            _ => {}
        }
        Ok(input)
    }

    fn close(&self) {
        println!("{}", style("Goodbye!").dim());
    }
}
