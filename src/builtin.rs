use crate::exec::ExitSignal;
use crate::parser::Stage;
use std::{env, path::PathBuf};

/// Commands implemented inside the interpreter's own process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinId {
    Cd,
    Pwd,
    Exit,
}

/// Look a command name up in the built-in catalog.
pub fn classify(name: &str) -> Option<BuiltinId> {
    match name {
        "cd" => Some(BuiltinId::Cd),
        "pwd" => Some(BuiltinId::Pwd),
        "exit" => Some(BuiltinId::Exit),
        _ => None,
    }
}

/// Run one built-in. Redirection and stream restoration are the caller's
/// business; this only performs the command's behavior.
pub fn invoke(id: BuiltinId, stage: &Stage) -> ExitSignal {
    match id {
        BuiltinId::Cd => run_cd(&stage.args),
        BuiltinId::Pwd => run_pwd(),
        BuiltinId::Exit => run_exit(&stage.args),
    }
}

/// Change the current directory. With no argument, go to the home
/// directory; further arguments are ignored.
fn run_cd(args: &[String]) -> ExitSignal {
    let path = if args.len() == 1 {
        // no argument given, move to the home directory or /
        dirs::home_dir()
            .or_else(|| Some(PathBuf::from("/")))
            .unwrap()
    } else {
        PathBuf::from(&args[1])
    };

    if let Err(e) = env::set_current_dir(&path) {
        eprintln!("cd: {}: {e}", path.display());
        ExitSignal::Continue(1)
    } else {
        ExitSignal::Continue(0)
    }
}

fn run_pwd() -> ExitSignal {
    match env::current_dir() {
        Ok(path) => {
            println!("{}", path.display());
            ExitSignal::Continue(0)
        }
        Err(e) => {
            eprintln!("pwd: {e}");
            ExitSignal::Continue(1)
        }
    }
}

/// Terminate the interpreter, with the first argument as the exit code
/// when one is given.
fn run_exit(args: &[String]) -> ExitSignal {
    let code = if let Some(s) = args.get(1) {
        if let Ok(n) = s.parse::<i32>() {
            n
        } else {
            eprintln!("exit: {s}: numeric argument required");
            return ExitSignal::Continue(1);
        }
    } else {
        0
    };

    ExitSignal::Quit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Stage;

    fn stage(args: &[&str]) -> Stage {
        Stage::new(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn classify_knows_the_catalog() {
        assert_eq!(classify("cd"), Some(BuiltinId::Cd));
        assert_eq!(classify("pwd"), Some(BuiltinId::Pwd));
        assert_eq!(classify("exit"), Some(BuiltinId::Exit));
        assert_eq!(classify("echo"), None);
        assert_eq!(classify("ls"), None);
    }

    #[test]
    fn exit_without_argument_quits_with_zero() {
        assert_eq!(
            invoke(BuiltinId::Exit, &stage(&["exit"])),
            ExitSignal::Quit(0)
        );
    }

    #[test]
    fn exit_with_code() {
        assert_eq!(
            invoke(BuiltinId::Exit, &stage(&["exit", "3"])),
            ExitSignal::Quit(3)
        );
    }

    #[test]
    fn exit_with_bad_argument_continues() {
        assert_eq!(
            invoke(BuiltinId::Exit, &stage(&["exit", "lots"])),
            ExitSignal::Continue(1)
        );
    }

    #[test]
    fn cd_to_missing_directory_fails() {
        assert_eq!(
            invoke(BuiltinId::Cd, &stage(&["cd", "/no/such/directory/here"])),
            ExitSignal::Continue(1)
        );
    }
}
