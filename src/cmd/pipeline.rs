use std::fmt;

use itertools::Itertools;

/// A single stage of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Program name followed by its arguments. Never empty once parsed.
    pub argv: Vec<String>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
    /// Not waited on, and writes to the terminal instead of the next stage.
    pub background: bool,
}

impl Command {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn with_input(mut self, path: impl Into<String>) -> Self {
        self.input_file = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.iter().join(" "))?;
        if let Some(input) = &self.input_file {
            write!(f, " < {input}")?;
        }
        if let Some(output) = &self.output_file {
            write!(f, " > {output}")?;
        }
        Ok(())
    }
}

/// Stages of one input line, in launch order. Always holds at least one
/// command when produced by the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    /// Whether the line ends without anything to wait for.
    pub fn is_detached(&self) -> bool {
        self.commands.iter().all(|cmd| cmd.background)
    }
}

impl From<Vec<Command>> for Pipeline {
    fn from(commands: Vec<Command>) -> Self {
        Self { commands }
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages = self.commands.iter().peekable();
        while let Some(cmd) = stages.next() {
            write!(f, "{cmd}")?;
            match (cmd.background, stages.peek().is_some()) {
                (true, true) => f.write_str(" & ")?,
                (true, false) => f.write_str(" &")?,
                (false, true) => f.write_str(" | ")?,
                (false, false) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_syntax() {
        let pipeline = Pipeline::from(vec![
            Command::new(["sleep", "5"]).in_background(),
            Command::new(["cat"]).with_input("in.txt"),
            Command::new(["wc", "-l"]).with_output("out.txt"),
        ]);

        assert_eq!(
            pipeline.to_string(),
            "sleep 5 & cat < in.txt | wc -l > out.txt"
        );
    }

    #[test]
    fn detached_only_when_every_stage_is_background() {
        let detached = Pipeline::from(vec![Command::new(["sleep", "1"]).in_background()]);
        assert!(detached.is_detached());

        let mixed = Pipeline::from(vec![
            Command::new(["sleep", "1"]).in_background(),
            Command::new(["ls"]),
        ]);
        assert!(!mixed.is_detached());
    }

    #[test]
    fn program_is_first_word() {
        assert_eq!(Command::new(["wc", "-l"]).program(), "wc");
        assert_eq!(Command::default().program(), "");
    }
}
