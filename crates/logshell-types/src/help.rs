use serde::{Deserialize, Serialize};

/// Which table a help entry belongs to; decides the prefix in synopses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HelpContext {
    #[default]
    Command,
    Sql,
}

impl HelpContext {
    pub fn prefix(self) -> char {
        match self {
            HelpContext::Command => ':',
            HelpContext::Sql => ';',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpParam {
    pub name: String,
    pub description: String,
    pub optional: bool,
}

/// Help attached to a command; rendered into diagnostics raised while the
/// command runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpText {
    pub context: HelpContext,
    pub name: String,
    pub summary: String,
    pub parameters: Vec<HelpParam>,
    pub examples: Vec<String>,
}

impl HelpText {
    pub fn command(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            context: HelpContext::Command,
            name: name.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn sql(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            context: HelpContext::Sql,
            ..Self::command(name, summary)
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.parameters.push(HelpParam {
            name: name.into(),
            description: description.into(),
            optional: false,
        });
        self
    }

    pub fn with_optional_parameter(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(HelpParam {
            name: name.into(),
            description: description.into(),
            optional: true,
        });
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// One-line usage, e.g. `:echo [-n] <msg>`.
    pub fn synopsis(&self) -> String {
        let mut line = format!("{}{}", self.context.prefix(), self.name);
        for param in &self.parameters {
            if param.optional {
                line.push_str(&format!(" [{}]", param.name));
            } else {
                line.push_str(&format!(" <{}>", param.name));
            }
        }
        line
    }

    pub fn format_for_term(&self) -> String {
        let mut out = format!("Synopsis\n  {}\n    {}", self.synopsis(), self.summary);

        if !self.parameters.is_empty() {
            let width = self
                .parameters
                .iter()
                .map(|p| p.name.len())
                .max()
                .unwrap_or(0);
            out.push_str("\nParameters");
            for param in &self.parameters {
                out.push_str(&format!(
                    "\n  {:width$}  {}",
                    param.name,
                    param.description,
                    width = width
                ));
            }
        }

        if !self.examples.is_empty() {
            out.push_str(if self.examples.len() == 1 {
                "\nExample"
            } else {
                "\nExamples"
            });
            for example in &self.examples {
                out.push_str(&format!("\n  {}", example));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synopsis_marks_optional_parameters() {
        let help = HelpText::command("echo", "Echo the given message")
            .with_optional_parameter("-n", "Do not print a line-feed")
            .with_parameter("msg", "The message to display");
        assert_eq!(help.synopsis(), ":echo [-n] <msg>");
    }

    #[test]
    fn test_sql_help_uses_query_prefix() {
        let help = HelpText::sql(".tables", "List the tables");
        assert_eq!(help.synopsis(), ";.tables");
    }

    #[test]
    fn test_format_for_term_sections() {
        let help = HelpText::command("redirect-to", "Redirect command output")
            .with_optional_parameter("path", "The file to write to")
            .with_example(":redirect-to /tmp/out.txt");
        let text = help.format_for_term();
        assert_eq!(
            text,
            "Synopsis\n  :redirect-to [path]\n    Redirect command output\nParameters\n  path  The file to write to\nExample\n  :redirect-to /tmp/out.txt"
        );
    }
}
