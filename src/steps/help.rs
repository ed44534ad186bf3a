//! Usage listing for `default` and `help`.

use async_trait::async_trait;
use colored::Colorize;

use crate::core::Step;
use crate::orchestration::Runner;
use crate::{klog, Result};

const COMMANDS: &[(&str, &str)] = &[
    ("watch", "watch the design and JS sources and rebuild on change"),
    (
        "build",
        "build the design and the JS of your project together",
    ),
    ("build-sass", "compile, bless and inject the design"),
    ("build-js", "lint, bundle and inject the JS"),
    ("fonts", "copy the icon fonts into the output directory"),
    ("webserver", "serve the output directory with live-reload"),
    ("run <task>", "run any registered task, e.g. `kiln run compile`"),
    ("tasks", "list every registered task"),
    ("help", "show this list"),
];

/// The command list, uncolored when `color` is false.
pub fn usage(color: bool) -> String {
    let header = "Please use one of the available commands:";
    let mut out = String::from("\n ");
    if color {
        out.push_str(&header.red().bold().to_string());
    } else {
        out.push_str(header);
    }
    out.push('\n');
    for (name, what) in COMMANDS {
        let line = format!("\t   - \"{}\": {}", name, what);
        if color {
            out.push_str(&line.green().to_string());
        } else {
            out.push_str(&line);
        }
        out.push('\n');
    }
    out.push_str("\n For minified files, add the `--production` option to the build commands.");
    out
}

/// Print the available commands. Performs no build action.
pub struct HelpStep;

#[async_trait]
impl Step for HelpStep {
    fn description(&self) -> &str {
        "List the available commands"
    }

    async fn run(&self, _runner: &Runner) -> Result<()> {
        klog!("{}", usage(true));
        Ok(())
    }
}
