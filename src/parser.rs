use crate::helper::DynError;
use std::path::PathBuf;

/// One pipeline element: a command with its arguments and optional file
/// redirections. `args[0]` is the program name and `args` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub args: Vec<String>,
    pub input_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl Stage {
    pub fn new(args: Vec<String>) -> Self {
        assert!(!args.is_empty());
        Stage {
            args,
            input_file: None,
            output_file: None,
        }
    }

    /// The program name (argument 0).
    pub fn command(&self) -> &str {
        &self.args[0]
    }
}

/// The ordered sequence of stages produced from one input line.
/// Read-only once constructed; dropped after one execution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandChain {
    stages: Vec<Stage>,
}

impl CommandChain {
    pub fn new(stages: Vec<Stage>) -> Self {
        assert!(!stages.is_empty());
        CommandChain { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        false // a chain always holds at least one stage
    }
}

/// Split on the pipe operator.
fn split_pipes(line: &str) -> Vec<&str> {
    line.split('|').collect()
}

/// Parse one pipe-free segment into a stage.
///
/// Tokens are whitespace-separated. `< file` redirects standard input,
/// `> file` redirects standard output; the attached forms `<file` and
/// `>file` are accepted as well. A later redirection of the same
/// direction replaces an earlier one.
fn parse_stage(segment: &str) -> Result<Stage, DynError> {
    let mut args = Vec::new();
    let mut input_file = None;
    let mut output_file = None;

    let mut tokens = segment.split_whitespace();
    while let Some(tok) = tokens.next() {
        let (redirect, rest) = match tok.as_bytes()[0] {
            b'<' => (Some(&mut input_file), &tok[1..]),
            b'>' => (Some(&mut output_file), &tok[1..]),
            _ => (None, tok),
        };
        match redirect {
            Some(slot) => {
                let target = if rest.is_empty() {
                    tokens.next().ok_or("redirection without a file name")?
                } else {
                    rest
                };
                *slot = Some(PathBuf::from(target));
            }
            None => args.push(rest.to_string()),
        }
    }

    if args.is_empty() {
        return Err("empty command".into());
    }

    Ok(Stage {
        args,
        input_file,
        output_file,
    })
}

/// Parse one input line into a command chain.
///
/// # Example
///
/// The input `"cat < in.txt | tr a-z A-Z > out.txt"` yields a two-stage
/// chain: `cat` reading `in.txt`, piped to `tr` writing `out.txt`.
pub fn parse_line(line: &str) -> Result<CommandChain, DynError> {
    let segments = split_pipes(line);

    let mut stages = Vec::with_capacity(segments.len());
    for segment in segments {
        stages.push(parse_stage(segment)?);
    }

    Ok(CommandChain::new(stages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command() {
        let chain = parse_line("echo abc def").unwrap();
        assert_eq!(chain.len(), 1);
        let stage = &chain.stages()[0];
        assert_eq!(stage.args, ["echo", "abc", "def"]);
        assert_eq!(stage.input_file, None);
        assert_eq!(stage.output_file, None);
    }

    #[test]
    fn pipe_chain() {
        let chain = parse_line("echo hi | tr h H | wc -c").unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.stages()[0].command(), "echo");
        assert_eq!(chain.stages()[1].args, ["tr", "h", "H"]);
        assert_eq!(chain.stages()[2].args, ["wc", "-c"]);
    }

    #[test]
    fn detached_redirections() {
        let chain = parse_line("cat < in.txt > out.txt").unwrap();
        let stage = &chain.stages()[0];
        assert_eq!(stage.args, ["cat"]);
        assert_eq!(stage.input_file, Some(PathBuf::from("in.txt")));
        assert_eq!(stage.output_file, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn attached_redirections() {
        let chain = parse_line("sort <in.txt >out.txt").unwrap();
        let stage = &chain.stages()[0];
        assert_eq!(stage.input_file, Some(PathBuf::from("in.txt")));
        assert_eq!(stage.output_file, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn redirection_on_middle_stage() {
        let chain = parse_line("echo x | cat < override.txt | wc").unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain.stages()[1].input_file,
            Some(PathBuf::from("override.txt"))
        );
        assert_eq!(chain.stages()[1].output_file, None);
    }

    #[test]
    fn empty_line_is_an_error() {
        assert!(parse_line("").is_err());
        assert!(parse_line("   ").is_err());
    }

    #[test]
    fn empty_stage_is_an_error() {
        assert!(parse_line("echo hi |").is_err());
        assert!(parse_line("| cat").is_err());
        assert!(parse_line("echo | | cat").is_err());
    }

    #[test]
    fn missing_redirection_target_is_an_error() {
        assert!(parse_line("cat <").is_err());
        assert!(parse_line("echo hi >").is_err());
    }

    #[test]
    fn redirection_only_is_an_error() {
        // A redirection without a command has no stage to apply to.
        assert!(parse_line("> out.txt").is_err());
    }
}
