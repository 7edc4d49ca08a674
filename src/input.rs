//! Reading input lines.
//!
//! An interrupt while waiting for input does not unwind anything: the read
//! returns [`Input::Interrupted`] and the caller starts over with a fresh
//! prompt. Plain reads check the relay's interrupt flag before reading. The
//! handlers restart the read itself, so a Ctrl-C typed at a plain prompt is
//! seen on the next line.

use crate::error::Result;
use crate::signals::Relay;
use rustyline::error::ReadlineError;
use rustyline::{Cmd, DefaultEditor, KeyEvent};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C or Ctrl-Z arrived while no job was in the foreground.
    Interrupted,
    Eof,
}

pub enum Reader {
    /// Line editing on a terminal. The editor runs the terminal in raw mode,
    /// so interactive keys arrive as keystrokes rather than signals.
    Editor(DefaultEditor),
    /// Plain buffered reads, for pipes and files.
    Plain,
}

impl Reader {
    pub fn new(interactive: bool) -> Result<Reader> {
        if !interactive {
            return Ok(Reader::Plain);
        }
        let mut editor = DefaultEditor::new()?;
        editor.bind_sequence(KeyEvent::ctrl('Z'), Cmd::Interrupt);
        Ok(Reader::Editor(editor))
    }

    pub fn read(&mut self, prompt: &str, relay: Option<&Relay>) -> Result<Input> {
        match self {
            Reader::Editor(editor) => match editor.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    Ok(Input::Line(line))
                }
                Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
                Err(ReadlineError::Eof) => Ok(Input::Eof),
                Err(e) => Err(e.into()),
            },
            Reader::Plain => read_plain(prompt, relay),
        }
    }
}

fn interrupted(relay: Option<&Relay>) -> bool {
    relay.map_or(false, Relay::take_interrupt)
}

fn read_plain(prompt: &str, relay: Option<&Relay>) -> Result<Input> {
    if interrupted(relay) {
        return Ok(Input::Interrupted);
    }
    if !prompt.is_empty() {
        print!("{}", prompt);
        io::stdout().flush()?;
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(Input::Eof);
    }
    let trimmed = line.trim_end_matches(&['\n', '\r'][..]).len();
    line.truncate(trimmed);
    Ok(Input::Line(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use pretty_assertions::assert_eq;

    #[test]
    fn pending_interrupt_is_reported_before_reading() {
        let relay = Relay::new();
        relay.forward(Signal::SIGINT);
        let input = Reader::Plain.read("", Some(&relay)).unwrap();
        assert_eq!(input, Input::Interrupted);
        assert!(!relay.take_interrupt());
    }
}
