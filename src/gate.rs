//! Operator confirmation. The sequencer blocks until the operator answers
//! every required round; the first "no" wins.

use std::io::{BufRead, Write};

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Granted,
    /// Granted without prompting (`--yes`). Reported separately so the run
    /// log shows the run was unattended.
    GrantedUnattended,
    Denied,
}

pub trait Confirm {
    fn confirm(&mut self, question: &str, rounds: u8) -> Result<Confirmation>;
}

/// Interactive gate: prompts on stderr, reads yes/no lines from stdin.
pub struct StdinGate;

impl Confirm for StdinGate {
    fn confirm(&mut self, question: &str, rounds: u8) -> Result<Confirmation> {
        let mut stdin = std::io::stdin().lock();
        let mut stderr = std::io::stderr().lock();
        confirm_from(&mut stdin, &mut stderr, question, rounds)
    }
}

/// Headless gate for unattended runs.
pub struct AssumeYesGate;

impl Confirm for AssumeYesGate {
    fn confirm(&mut self, _question: &str, _rounds: u8) -> Result<Confirmation> {
        Ok(Confirmation::GrantedUnattended)
    }
}

pub fn confirm_from(
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
    question: &str,
    rounds: u8,
) -> Result<Confirmation> {
    for round in 0..rounds.max(1) {
        if round == 0 {
            write!(writer, "{question} [y/N]: ")?;
        } else {
            write!(writer, "Confirm once more to proceed [y/N]: ")?;
        }
        writer.flush()?;

        let mut input = String::new();
        let n = reader.read_line(&mut input)?;
        if n == 0 {
            // EOF: treat like a declined prompt.
            return Ok(Confirmation::Denied);
        }
        let answer = input.trim().to_ascii_lowercase();
        if answer != "y" && answer != "yes" {
            return Ok(Confirmation::Denied);
        }
    }
    Ok(Confirmation::Granted)
}
