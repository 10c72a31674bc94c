//! Command Builder
//!
//! Turns validated option and target tokens into an argument vector for the
//! scanner. The vector is passed to the OS as discrete arguments; it is never
//! joined into a shell string.

use super::options::OptionList;
use super::targets::TargetList;

/// Flag selecting XML output
pub const MACHINE_OUTPUT_FLAG: &str = "-oX";

/// Output destination for [`MACHINE_OUTPUT_FLAG`] (standard output)
pub const MACHINE_OUTPUT_TARGET: &str = "-";

/// A scanner invocation built from validated input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCommand {
    /// The executable to run
    program: String,

    /// Arguments in order: options, `-oX -`, targets
    args: Vec<String>,
}

impl ScanCommand {
    /// Build `<program> <options...> -oX - <targets...>`.
    ///
    /// The XML output pair is always present whatever the caller asked for.
    pub fn new(program: impl Into<String>, options: &OptionList, targets: &TargetList) -> Self {
        let mut args =
            Vec::with_capacity(options.tokens().len() + 2 + targets.tokens().len());
        args.extend(options.tokens().iter().cloned());
        args.push(MACHINE_OUTPUT_FLAG.to_string());
        args.push(MACHINE_OUTPUT_TARGET.to_string());
        args.extend(targets.tokens().iter().cloned());

        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argument vector including the program name
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Unvalidated command, for exercising the runner directly in tests
    #[cfg(test)]
    pub(crate) fn from_parts<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}
