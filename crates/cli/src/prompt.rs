use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    Ask,
    Skip,
}

/// Ask on the terminal unless confirmation is skipped.
pub fn confirm(mode: Confirm, question: &str) -> io::Result<bool> {
    match mode {
        Confirm::Skip => Ok(true),
        Confirm::Ask => ask(question, &mut io::stdin().lock(), &mut io::stderr()),
    }
}

/// Only an explicit `y`/`yes` counts; end of input is a no.
fn ask(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "  {question} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> bool {
        let mut out = Vec::new();
        ask("Proceed?", &mut text.as_bytes(), &mut out).unwrap()
    }

    #[test]
    fn accepts_only_explicit_yes() {
        assert!(answer("y\n"));
        assert!(answer("YES\n"));
        assert!(!answer("n\n"));
        assert!(!answer("\n"));
        assert!(!answer(""));
    }

    #[test]
    fn skip_never_reads_input() {
        assert!(confirm(Confirm::Skip, "Proceed?").unwrap());
    }
}
