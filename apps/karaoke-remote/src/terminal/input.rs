use thiserror::Error;

/// One line typed at the remote prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    Empty,
    Search(String),
    Suggest(String),
    /// Reserve the n-th (1-based) search hit, optionally at the front.
    Reserve { index: usize, first: bool },
    /// Queue positions are 1-based as displayed.
    MoveFirst(u32),
    MoveUp(u32),
    Remove(u32),
    ShowState,
    Online,
    Visible(bool),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),
    #[error("`{command}` needs {expected}")]
    MissingArgument {
        command: String,
        expected: &'static str,
    },
    #[error("`{value}` is not a valid {expected}")]
    InvalidNumber {
        value: String,
        expected: &'static str,
    },
}

pub const HELP: &str = "\
commands:
  search <keyword>   search the catalogue
  suggest <text>     as-you-type suggestions
  res <n>            reserve search hit n
  first <n>          reserve search hit n at the front of the queue
  top <pos>          move queue entry to the front
  up <pos>           move queue entry up one place
  rm <pos>           remove queue entry
  state              show queue and now playing
  online | visible | hidden
  quit";

pub fn parse_line(line: &str) -> Result<UserIntent, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(UserIntent::Empty);
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let command_lower = command.to_ascii_lowercase();
    match command_lower.as_str() {
        "search" | "s" => Ok(UserIntent::Search(text_argument(&command_lower, rest)?)),
        // An empty suggestion is meaningful: it cancels the pending one.
        "suggest" | "?" => Ok(UserIntent::Suggest(rest.to_string())),
        "res" | "r" => Ok(UserIntent::Reserve {
            index: number_argument(&command_lower, rest, "search result number")? as usize,
            first: false,
        }),
        "first" | "f" => Ok(UserIntent::Reserve {
            index: number_argument(&command_lower, rest, "search result number")? as usize,
            first: true,
        }),
        "top" => Ok(UserIntent::MoveFirst(number_argument(&command_lower, rest, "queue position")?)),
        "up" => Ok(UserIntent::MoveUp(number_argument(&command_lower, rest, "queue position")?)),
        "rm" | "remove" => Ok(UserIntent::Remove(number_argument(&command_lower, rest, "queue position")?)),
        "state" | "queue" => Ok(UserIntent::ShowState),
        "online" => Ok(UserIntent::Online),
        "visible" => Ok(UserIntent::Visible(true)),
        "hidden" => Ok(UserIntent::Visible(false)),
        "help" | "h" => Ok(UserIntent::Help),
        "quit" | "exit" | "q" => Ok(UserIntent::Quit),
        _ => Err(InputError::Unknown(command.to_string())),
    }
}

fn text_argument(command: &str, rest: &str) -> Result<String, InputError> {
    if rest.is_empty() {
        return Err(InputError::MissingArgument {
            command: command.to_string(),
            expected: "some text",
        });
    }
    Ok(rest.to_string())
}

fn number_argument(command: &str, rest: &str, expected: &'static str) -> Result<u32, InputError> {
    if rest.is_empty() {
        return Err(InputError::MissingArgument {
            command: command.to_string(),
            expected,
        });
    }
    match rest.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(InputError::InvalidNumber {
            value: rest.to_string(),
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queue_commands() {
        assert_eq!(parse_line("rm 2"), Ok(UserIntent::Remove(2)));
        assert_eq!(parse_line("  TOP 1 "), Ok(UserIntent::MoveFirst(1)));
        assert_eq!(parse_line("up 3"), Ok(UserIntent::MoveUp(3)));
        assert_eq!(
            parse_line("first 4"),
            Ok(UserIntent::Reserve { index: 4, first: true })
        );
    }

    #[test]
    fn keeps_search_text_verbatim() {
        assert_eq!(
            parse_line("search  Bohemian Rhapsody"),
            Ok(UserIntent::Search("Bohemian Rhapsody".into()))
        );
        assert_eq!(parse_line("suggest"), Ok(UserIntent::Suggest(String::new())));
        assert_eq!(parse_line(""), Ok(UserIntent::Empty));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            parse_line("rm"),
            Err(InputError::MissingArgument {
                command: "rm".into(),
                expected: "queue position"
            })
        );
        assert!(matches!(parse_line("rm 0"), Err(InputError::InvalidNumber { .. })));
        assert!(matches!(parse_line("res two"), Err(InputError::InvalidNumber { .. })));
        assert_eq!(parse_line("dance"), Err(InputError::Unknown("dance".into())));
    }
}
