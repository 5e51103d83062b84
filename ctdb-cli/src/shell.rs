/// Interactive REPL shell for Cottontail DB
///
/// Provides line editing, history and completion of command words. Every
/// line is one command; errors are printed and the loop continues.

use crate::commands::{self, actions, COMMANDS};
use crate::OutputFormat;
use anyhow::{Context, Result};
use colored::Colorize;
use ctdb_client::Client;
use rustyline::error::ReadlineError;
use rustyline::{
    completion::{Completer, Pair},
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    Helper,
};
use std::path::PathBuf;
use tracing::debug;

/// Completion of command and action words
#[derive(Clone)]
struct CommandCompleter;

impl CommandCompleter {
    fn candidates(words: &[&str], prefix: &str) -> Vec<Pair> {
        words
            .iter()
            .filter(|word| word.starts_with(prefix))
            .map(|word| Pair {
                display: word.to_string(),
                replacement: word.to_string(),
            })
            .collect()
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_prefix = &line[..pos];
        let word_start = line_prefix
            .char_indices()
            .rfind(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let word = &line_prefix[word_start..];
        let previous: Vec<&str> = line_prefix[..word_start].split_whitespace().collect();

        let candidates = match previous.as_slice() {
            [] => Self::candidates(COMMANDS, word),
            [command] => Self::candidates(actions(command), word),
            _ => Vec::new(),
        };
        Ok((word_start, candidates))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}

impl Validator for CommandCompleter {}

impl Helper for CommandCompleter {}

/// Interactive shell session state
pub struct Shell {
    /// Line editor with history and completion
    editor: rustyline::Editor<CommandCompleter, rustyline::history::FileHistory>,
    history_path: PathBuf,
    /// Shown in the prompt
    endpoint: String,
    format: OutputFormat,
}

impl Shell {
    pub fn new(endpoint: String, format: OutputFormat) -> Result<Self> {
        let mut editor = rustyline::Editor::new().context("Failed to initialize line editor")?;
        editor.set_helper(Some(CommandCompleter));

        let history_path = dirs::home_dir()
            .map(|p| p.join(".ctdb_history"))
            .unwrap_or_else(|| ".ctdb_history".into());

        if history_path.exists() {
            if let Err(e) = editor.load_history(&history_path) {
                debug!("Could not load history from {}: {}", history_path.display(), e);
            }
        }

        Ok(Self {
            editor,
            history_path,
            endpoint,
            format,
        })
    }

    /// Run the REPL until `stop`, Ctrl+D or a terminal error
    pub async fn run(&mut self, client: &mut Client) -> Result<()> {
        println!(
            "{} {}",
            "Connected to".dimmed(),
            self.endpoint.as_str().cyan()
        );
        println!("{}", "Type 'help' for available commands".dimmed());

        let prompt = format!("{} ", "ctdb>".green().bold());
        loop {
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    let words: Vec<&str> = line.split_whitespace().collect();
                    match commands::execute(client, self.format, &words).await {
                        Ok(Some(output)) => println!("{}", output),
                        Ok(None) => break,
                        Err(e) => eprintln!("{} {:#}", "Error:".red().bold(), e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error reading line: {}", err);
                    break;
                }
            }
        }

        println!("{}", "Goodbye!".dimmed());
        self.editor
            .save_history(&self.history_path)
            .context("Failed to save history")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn complete(line: &str) -> (usize, Vec<String>) {
        let history = DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);
        let (start, pairs) = CommandCompleter.complete(line, line.len(), &ctx).unwrap();
        (start, pairs.into_iter().map(|p| p.replacement).collect())
    }

    #[test]
    fn test_complete_command() {
        let (start, words) = complete("sch");
        assert_eq!(start, 0);
        assert_eq!(words, vec!["schema"]);
    }

    #[test]
    fn test_complete_action() {
        let (start, words) = complete("entity pr");
        assert_eq!(start, 7);
        assert_eq!(words, vec!["preview"]);

        let (_, words) = complete("transaction ");
        assert_eq!(words, vec!["begin", "commit", "rollback"]);
    }

    #[test]
    fn test_complete_after_multibyte_whitespace() {
        let (start, words) = complete("schema\u{a0}cr");
        assert_eq!(start, "schema\u{a0}".len());
        assert_eq!(words, vec!["create"]);

        let (start, words) = complete("entity\u{3000}ab");
        assert_eq!(start, "entity\u{3000}".len());
        assert_eq!(words, vec!["about"]);
    }

    #[test]
    fn test_no_completion_for_arguments() {
        let (_, words) = complete("schema create sc");
        assert!(words.is_empty());
    }
}
