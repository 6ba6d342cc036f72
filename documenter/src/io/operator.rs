//! Human operator channel used for clarifications and interactive prompts.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, anyhow};

/// The person supervising a run.
pub trait Operator {
    /// Ask a question and wait for a single-line answer.
    fn ask(&self, prompt: &str) -> Result<String>;

    /// Print an informational message.
    fn notify(&self, message: &str);

    /// Present clarification questions raised by the model.
    fn show_questions(&self, questions: &[String]);
}

/// Line-oriented operator over stdin/stdout.
#[derive(Debug, Default)]
pub struct StdioOperator;

impl Operator for StdioOperator {
    fn ask(&self, prompt: &str) -> Result<String> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{prompt}\n> ").context("write prompt")?;
        stdout.flush().context("flush stdout")?;
        drop(stdout);

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read operator answer")?;
        if read == 0 {
            return Err(anyhow!("stdin closed before an answer was given"));
        }
        Ok(line.trim().to_string())
    }

    fn notify(&self, message: &str) {
        println!("{message}");
    }

    fn show_questions(&self, questions: &[String]) {
        println!("The agent needs clarification before it can continue:");
        for (idx, question) in questions.iter().enumerate() {
            println!("  {}. {question}", idx + 1);
        }
    }
}
