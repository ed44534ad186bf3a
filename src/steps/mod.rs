//! Build steps and the standard task registry.
//!
//! Leaf steps each wrap one unit of work (an external tool run or a small
//! file transformation). [`default_registry`] wires them into the composite
//! tasks the CLI exposes.

pub mod bless;
pub mod fonts;
pub mod help;
pub mod inject;
pub mod scripts;
pub mod serve;
pub mod styles;
pub mod watch;

use std::sync::Arc;

use crate::core::{Banner, Stage, TaskDef, TaskRegistry};
use crate::Result;

pub use bless::BlessStep;
pub use fonts::FontsStep;
pub use help::HelpStep;
pub use inject::{AssetKind, InjectStep};
pub use scripts::{BundleStep, LintStep};
pub use serve::ServeStep;
pub use styles::CompileStep;
pub use watch::WatchStep;

/// The standard pipeline:
///
/// - `build-sass` = compile -> bless -> inject-css
/// - `build-js` = jslint -> browserify -> inject-js
/// - `build` = [build-sass, build-js]
pub fn default_registry() -> Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();

    registry.register("default", Arc::new(HelpStep))?;
    registry.register("help", Arc::new(HelpStep))?;

    registry.register("compile", Arc::new(CompileStep))?;
    registry.register("bless", Arc::new(BlessStep))?;
    registry.register("inject-css", Arc::new(InjectStep::new(AssetKind::Css)))?;

    registry.register("jslint", Arc::new(LintStep))?;
    registry.register("browserify", Arc::new(BundleStep))?;
    registry.register("inject-js", Arc::new(InjectStep::new(AssetKind::Js)))?;

    registry.register("fonts", Arc::new(FontsStep))?;
    registry.register("watch", Arc::new(WatchStep))?;
    registry.register("webserver", Arc::new(ServeStep))?;

    registry.insert(
        TaskDef::sequence(
            "build-sass",
            "Compile, bless and inject the stylesheets",
            vec!["compile".into(), "bless".into(), "inject-css".into()],
        )
        .with_banner(Banner::Line("Building the design".to_string())),
    )?;
    registry.insert(
        TaskDef::sequence(
            "build-js",
            "Lint, bundle and inject the scripts",
            vec!["jslint".into(), "browserify".into(), "inject-js".into()],
        )
        .with_banner(Banner::Line("Building the JavaScript".to_string())),
    )?;
    registry.insert(
        TaskDef::sequence(
            "build",
            "Build the design and the JavaScript together",
            vec![Stage::parallel(&["build-sass", "build-js"])],
        )
        .with_banner(Banner::Boxed(vec![
            "Start building your project".to_string()
        ])),
    )?;

    registry.validate()?;
    Ok(registry)
}
