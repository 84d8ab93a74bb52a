//! Terminal folder browser for `link`.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use accredify_common::{Error, FolderRef, Result};
use accredify_storage::gdrive::{FolderChooser, PickerChoice};

const HELP: &str = "  <n> open folder n, s select this folder, s <n> select folder n, u up, q cancel";

/// Reads picker choices from standard input.
pub struct TerminalChooser {
    input: Mutex<BufReader<Stdin>>,
}

impl TerminalChooser {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }

    async fn read_line(&self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self.input.lock().await.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

#[async_trait]
impl FolderChooser for TerminalChooser {
    async fn choose(&self, current: &FolderRef, children: &[FolderRef]) -> Result<PickerChoice> {
        println!();
        println!("{}", current.name);
        if children.is_empty() {
            println!("  (no folders)");
        }
        for (i, child) in children.iter().enumerate() {
            println!("  [{}] {}/", i + 1, child.name);
        }
        println!("{}", HELP);

        loop {
            print!("> ");
            std::io::Write::flush(&mut std::io::stdout())?;

            // End of input dismisses the picker.
            let Some(line) = self.read_line().await? else {
                return Err(Error::SelectionCancelled);
            };
            match parse_choice(&line, current, children) {
                Some(choice) => return Ok(choice),
                None => println!("Unrecognized choice.\n{}", HELP),
            }
        }
    }
}

/// Interpret one line of operator input.
fn parse_choice(line: &str, current: &FolderRef, children: &[FolderRef]) -> Option<PickerChoice> {
    let child = |n: &str| {
        n.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| children.get(i))
            .cloned()
    };

    let mut words = line.split_whitespace();
    match (words.next()?, words.next(), words.next()) {
        ("q", None, None) => Some(PickerChoice::Cancel),
        ("u", None, None) => Some(PickerChoice::Up),
        ("s", None, None) => Some(PickerChoice::Select(current.clone())),
        ("s", Some(n), None) => child(n).map(PickerChoice::Select),
        (n, None, None) => child(n).map(PickerChoice::Open),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level() -> (FolderRef, Vec<FolderRef>) {
        (
            FolderRef::new("root", "My Drive"),
            vec![FolderRef::new("a", "Accreditation"), FolderRef::new("b", "Archive")],
        )
    }

    #[test]
    fn test_parse_navigation() {
        let (current, children) = level();
        assert_eq!(
            parse_choice("2\n", &current, &children),
            Some(PickerChoice::Open(FolderRef::new("b", "Archive")))
        );
        assert_eq!(parse_choice("u", &current, &children), Some(PickerChoice::Up));
        assert_eq!(parse_choice(" q ", &current, &children), Some(PickerChoice::Cancel));
    }

    #[test]
    fn test_parse_selection() {
        let (current, children) = level();
        assert_eq!(
            parse_choice("s", &current, &children),
            Some(PickerChoice::Select(current.clone()))
        );
        assert_eq!(
            parse_choice("s 1", &current, &children),
            Some(PickerChoice::Select(FolderRef::new("a", "Accreditation")))
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let (current, children) = level();
        assert_eq!(parse_choice("0", &current, &children), None);
        assert_eq!(parse_choice("3", &current, &children), None);
        assert_eq!(parse_choice("s 9", &current, &children), None);
        assert_eq!(parse_choice("", &current, &children), None);
        assert_eq!(parse_choice("open 1", &current, &children), None);
    }
}
