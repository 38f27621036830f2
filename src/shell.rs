use crate::exec::{self, ExitSignal};
use crate::helper::DynError;
use crate::parser;
use rustyline::{error::ReadlineError, Editor};
use std::process::exit;

#[derive(Debug)]
pub struct Shell {
    logfile: String, // history file
}

impl Shell {
    pub fn new(logfile: &str) -> Self {
        Shell {
            logfile: logfile.to_string(),
        }
    }

    /// The read-eval-print loop. Reads a line, parses it into a chain,
    /// hands the chain to the executor and interprets the returned
    /// signal. Does not return; the process exits here.
    pub fn run(&self) -> Result<(), DynError> {
        let mut rl = Editor::<()>::new()?;
        if let Err(e) = rl.load_history(&self.logfile) {
            eprintln!("pipesh: failed to load the history file: {e}");
        }

        let exit_val; // the interpreter's exit code
        let mut prev = 0; // status of the previous cycle
        loop {
            let prompt = if prev == 0 {
                "pipesh $ ".to_string()
            } else {
                format!("pipesh [{prev}] $ ")
            };
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue; // reread on an empty line
                    }
                    rl.add_history_entry(trimmed);

                    match parser::parse_line(trimmed) {
                        Ok(chain) => match exec::execute(&chain) {
                            ExitSignal::Continue(n) => prev = n,
                            ExitSignal::Quit(n) => {
                                exit_val = n;
                                break;
                            }
                        },
                        Err(e) => {
                            eprintln!("pipesh: {e}");
                            prev = 1;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    eprintln!("pipesh: leave with exit or Ctrl+D")
                }
                Err(ReadlineError::Eof) => {
                    exit_val = prev;
                    break;
                }
                Err(e) => {
                    eprintln!("pipesh: read error\n{e}");
                    exit_val = 1;
                    break;
                }
            }
        }

        if let Err(e) = rl.save_history(&self.logfile) {
            eprintln!("pipesh: failed to save the history file: {e}");
        }
        exit(exit_val);
    }
}
