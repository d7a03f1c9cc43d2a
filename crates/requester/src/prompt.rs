//! Line-oriented operator input.
//!
//! Blank prompt text ends the session; blank dimensions select the
//! default; an invalid dimension prints the reason and asks again.

use std::io::Write;

use imgpool_core::job::{parse_dimension_input, DEFAULT_DIMENSION};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

pub struct Prompter<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Prompter<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    /// Operator-facing output.
    pub fn out(&mut self) -> &mut W {
        &mut self.out
    }

    /// Ask a question; `None` at end of input.
    pub async fn ask(&mut self, question: &str) -> std::io::Result<Option<String>> {
        write!(self.out, "{question}")?;
        self.out.flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// The next prompt text, or `None` when the operator is done.
    pub async fn read_prompt(&mut self) -> std::io::Result<Option<String>> {
        let answer = self
            .ask("Enter prompt (empty prompt exits): ")
            .await?;
        Ok(answer.filter(|prompt| !prompt.is_empty()))
    }

    /// A width or height, re-asking until the input is acceptable.
    pub async fn read_dimension(&mut self, field: &str) -> std::io::Result<Option<u32>> {
        loop {
            let question = format!("Enter {field} (blank for {DEFAULT_DIMENSION}): ");
            let Some(answer) = self.ask(&question).await? else {
                return Ok(None);
            };
            match parse_dimension_input(field, &answer) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => writeln!(self.out, "{e}")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::BufReader;

    use super::*;

    fn prompter(input: &'static str) -> Prompter<BufReader<&'static [u8]>, Vec<u8>> {
        Prompter::new(BufReader::new(input.as_bytes()), Vec::new())
    }

    #[tokio::test]
    async fn blank_prompt_ends_session() {
        let mut p = prompter("   \n");
        assert_eq!(p.read_prompt().await.unwrap(), None);
    }

    #[tokio::test]
    async fn end_of_input_ends_session() {
        let mut p = prompter("");
        assert_eq!(p.read_prompt().await.unwrap(), None);
    }

    #[tokio::test]
    async fn prompt_is_trimmed() {
        let mut p = prompter("  a cat  \n");
        assert_eq!(p.read_prompt().await.unwrap().as_deref(), Some("a cat"));
    }

    #[tokio::test]
    async fn too_small_dimension_is_reprompted() {
        let mut p = prompter("10\nwide\n64\n");
        assert_eq!(p.read_dimension("width").await.unwrap(), Some(64));

        let shown = String::from_utf8(p.out().clone()).unwrap();
        assert_eq!(shown.matches("Enter width").count(), 3);
        assert!(shown.contains("at least 32"));
        assert!(shown.contains("whole number"));
    }

    #[tokio::test]
    async fn blank_dimension_selects_default() {
        let mut p = prompter("10\n\n");
        assert_eq!(p.read_dimension("height").await.unwrap(), Some(128));
    }
}
