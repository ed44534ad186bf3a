//! Build pipeline integration tests.
//!
//! These tests run `build-sass`, `build-js`, `build` and `fonts` from the
//! standard registry against a temporary project.

use tokio_test::{assert_err, assert_ok};

use kiln::core::{BuildMode, TaskOutcome};
use kiln::orchestration::FailurePolicy;
use kiln::Error;

use crate::fixtures::{TestProject, SYNTAX_ERROR, TEMPLATE};

const CSS_TAG: &str = "<link rel=\"stylesheet\" href=\"css/blessed/main.css\">";
const JS_TAG: &str = "<script src=\"js/app.js\"></script>";

// ============================================================================
// Stylesheets
// ============================================================================

/// Test: Component imports
/// Given two component partials a.scss and b.scss
/// When build-sass runs
/// Then the compiled stylesheet contains both, in path order, and the main
/// stylesheet on disk is unchanged
#[tokio::test]
async fn test_build_sass_imports_components() {
    let project = TestProject::new();
    project.write("src/components/b/scss/b.scss", ".b {\n    color: green;\n}\n");
    project.write("src/components/a/scss/a.scss", ".a {\n    color: blue;\n}\n");
    project.write("src/components/a/scss/_private.scss", ".private { color: red; }\n");
    let source_before = project.read("src/scss/main.scss");

    assert_ok!(project.runner(BuildMode::Development).run("build-sass").await);

    let css = project.read("dist/css/main.css");
    let a = css.find(".a {").expect("component a compiled");
    let b = css.find(".b {").expect("component b compiled");
    assert!(a < b);
    assert!(css.contains("body {"));
    assert!(!css.contains(".private"));
    assert_eq!(project.read("src/scss/main.scss"), source_before);
}

/// Test: Stylesheet injection
/// Given no built page yet
/// When build-sass runs
/// Then the page is seeded from the template and links the blessed sheet
#[tokio::test]
async fn test_build_sass_seeds_and_injects_template() {
    let project = TestProject::new();
    assert!(!project.exists("dist/index.html"));

    assert_ok!(project.runner(BuildMode::Development).run("build-sass").await);

    let page = project.read("dist/index.html");
    assert!(page.contains(&format!(
        "    <!-- inject:css -->\n    {}\n    <!-- endinject -->",
        CSS_TAG
    )));
    // The script region is still empty.
    assert!(page.contains("    <!-- inject:js -->\n    <!-- endinject -->"));
    // The source template is never modified.
    assert_eq!(project.read("src/html/index.html"), TEMPLATE);
}

/// Test: Blessing
/// Given a stylesheet with more selectors than the limit
/// When build-sass runs
/// Then the parts concatenate back to the compiled sheet and are all linked
/// in order
#[tokio::test]
async fn test_bless_splits_and_links_every_part() {
    let project = TestProject::new();
    project.write(
        "src/scss/main.scss",
        ".a { color: red; }\n.b { color: red; }\n.c { color: red; }\n.d, .e { color: red; }\n",
    );
    let mut config = project.config();
    config.styles.selector_limit = 2;

    assert_ok!(
        project
            .runner_with(config, BuildMode::Development)
            .run("build-sass")
            .await
    );

    assert_eq!(
        project.list("dist/css/blessed"),
        vec!["main-blessed1.css", "main-blessed2.css", "main-blessed3.css"]
    );
    let joined: String = (1..=3)
        .map(|i| project.read(&format!("dist/css/blessed/main-blessed{}.css", i)))
        .collect();
    assert_eq!(joined, project.read("dist/css/main.css"));

    let page = project.read("dist/index.html");
    let first = page.find("main-blessed1.css").unwrap();
    let second = page.find("main-blessed2.css").unwrap();
    let third = page.find("main-blessed3.css").unwrap();
    assert!(first < second && second < third);
}

/// Test: Stale parts
/// Given a previous run that produced three parts
/// When the stylesheet fits in one file
/// Then the old parts are removed and only the single sheet is linked
#[tokio::test]
async fn test_bless_removes_stale_parts() {
    let project = TestProject::new();
    project.write(
        "src/scss/main.scss",
        ".a { color: red; }\n.b { color: red; }\n.c { color: red; }\n",
    );
    let mut config = project.config();
    config.styles.selector_limit = 1;
    assert_ok!(
        project
            .runner_with(config, BuildMode::Development)
            .run("build-sass")
            .await
    );
    assert_eq!(project.list("dist/css/blessed").len(), 3);

    assert_ok!(project.runner(BuildMode::Development).run("build-sass").await);

    assert_eq!(project.list("dist/css/blessed"), vec!["main.css"]);
    let page = project.read("dist/index.html");
    assert!(page.contains(CSS_TAG));
    assert!(!page.contains("blessed1"));
}

/// Test: Idempotent stylesheet build
/// Given a production build-sass that split the sheet into parts
/// When build-sass runs again with the same sources
/// Then every stylesheet output is byte-identical and the source is untouched
#[tokio::test]
async fn test_build_sass_is_idempotent() {
    let project = TestProject::new();
    project.write(
        "src/components/nav/scss/nav.scss",
        ".nav, .nav-item {\n    color: blue;\n}\n",
    );
    let extra = ".a { color: red; }\n.b { color: red; }\n";
    project.write(
        "src/scss/main.scss",
        &format!("{}{}", project.read("src/scss/main.scss"), extra),
    );
    let source = project.read("src/scss/main.scss");
    let mut config = project.config();
    config.styles.selector_limit = 2;

    let snapshot = |project: &TestProject| -> Vec<(String, String)> {
        let mut files = vec![("main.css".to_string(), project.read("dist/css/main.css"))];
        for name in project.list("dist/css/blessed") {
            let text = project.read(&format!("dist/css/blessed/{}", name));
            files.push((name, text));
        }
        files
    };

    assert_ok!(
        project
            .runner_with(config.clone(), BuildMode::Production)
            .run("build-sass")
            .await
    );
    let first = snapshot(&project);
    assert!(first.len() > 2);

    assert_ok!(
        project
            .runner_with(config, BuildMode::Production)
            .run("build-sass")
            .await
    );
    assert_eq!(snapshot(&project), first);
    assert_eq!(project.read("src/scss/main.scss"), source);
}

/// Test: Compile failure
/// Given a stylesheet the compiler rejects
/// When build-sass runs
/// Then the compile step fails and nothing is written
#[tokio::test]
async fn test_compile_error_is_a_hard_failure() {
    let project = TestProject::new();
    project.write("src/scss/main.scss", "body { color: $undefined; }\n");

    let err = assert_err!(project.runner(BuildMode::Development).run("build-sass").await);
    match err {
        Error::TaskFailed { task, detail } => {
            assert_eq!(task, "compile");
            assert_eq!(detail, "sass: Undefined variable.");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!project.exists("dist/css/main.css"));
    assert!(!project.exists("dist/index.html"));
}

// ============================================================================
// Scripts
// ============================================================================

/// Test: Script pipeline
/// Given an entry that requires a sibling module
/// When build-js runs
/// Then the bundle contains the module and the page references it
#[tokio::test]
async fn test_build_js_bundles_and_injects() {
    let project = TestProject::new();

    assert_ok!(project.runner(BuildMode::Development).run("build-js").await);

    let bundle = project.read("dist/js/app.js");
    assert!(bundle.contains("items: []"));
    assert!(bundle.contains("function start()"));
    let page = project.read("dist/index.html");
    assert!(page.contains(&format!(
        "    <!-- inject:js -->\n    {}\n    <!-- endinject -->",
        JS_TAG
    )));
}

/// Test: Production mode
/// Given the same sources
/// When build-js runs with --production
/// Then the bundle is smaller than the development one
#[tokio::test]
async fn test_production_bundle_is_smaller() {
    let project = TestProject::new();

    assert_ok!(project.runner(BuildMode::Development).run("build-js").await);
    let development = project.read("dist/js/app.js");

    assert_ok!(project.runner(BuildMode::Production).run("build-js").await);
    let production = project.read("dist/js/app.js");

    assert!(production.len() < development.len());
    assert!(production.contains("function start()"));
}

/// Test: Broken module
/// Given a successful build followed by a syntax error in a module
/// When build-js runs again
/// Then browserify fails and the previous bundle is left in place
#[tokio::test]
async fn test_syntax_error_keeps_previous_bundle() {
    let project = TestProject::new();
    assert_ok!(project.runner(BuildMode::Development).run("build-js").await);
    let bundle_before = project.read("dist/js/app.js");

    project.write("src/js/nav.js", &format!("module.exports = {{}};\n{}\n", SYNTAX_ERROR));
    let report = assert_ok!(
        project
            .runner(BuildMode::Development)
            .with_policy(FailurePolicy::LogAndContinue)
            .run("build-js")
            .await
    );

    match report.outcome {
        TaskOutcome::Failed { task, detail } => {
            assert_eq!(task, "browserify");
            assert!(detail.starts_with("browserify: ParseError"));
        }
        TaskOutcome::Succeeded => panic!("build-js should fail"),
    }
    assert_eq!(project.read("dist/js/app.js"), bundle_before);
}

/// Test: Lint findings
/// Given a module with a forgotten debugger statement
/// When build-js runs
/// Then the findings are reported but the build succeeds
#[tokio::test]
async fn test_lint_findings_do_not_fail_the_build() {
    let project = TestProject::new();
    project.write("src/js/nav.js", "debugger;\nmodule.exports = { items: [] };\n");

    let report = assert_ok!(project.runner(BuildMode::Development).run("build-js").await);
    assert!(report.outcome.is_success());
    assert!(project.exists("dist/js/app.js"));
}

/// Test: Missing entry
/// Given a project without a script entry
/// When build-js runs
/// Then browserify fails with a missing-source error
#[tokio::test]
async fn test_missing_script_entry() {
    let project = TestProject::new();
    std::fs::remove_file(project.path("src/js/app.js")).unwrap();

    let err = assert_err!(project.runner(BuildMode::Development).run("build-js").await);
    match err {
        Error::TaskFailed { task, detail } => {
            assert_eq!(task, "browserify");
            assert!(detail.contains("Missing source file"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

// ============================================================================
// Full build
// ============================================================================

/// Test: Full build
/// Given a fresh project
/// When build runs
/// Then both pipelines write their outputs and both regions are filled
#[tokio::test]
async fn test_build_runs_both_pipelines() {
    let project = TestProject::new();

    let report = assert_ok!(project.runner(BuildMode::Development).run("build").await);
    assert_eq!(report.task, "build");

    assert!(project.exists("dist/css/main.css"));
    assert!(project.exists("dist/css/blessed/main.css"));
    assert!(project.exists("dist/js/app.js"));
    let page = project.read("dist/index.html");
    assert!(page.contains(CSS_TAG));
    assert!(page.contains(JS_TAG));
}

/// Test: Idempotent injection
/// Given a built project
/// When build runs again with the same sources
/// Then the page is byte-identical
#[tokio::test]
async fn test_rebuild_leaves_page_unchanged() {
    let project = TestProject::new();
    assert_ok!(project.runner(BuildMode::Development).run("build").await);
    let first = project.read("dist/index.html");

    assert_ok!(project.runner(BuildMode::Development).run("build").await);
    assert_eq!(project.read("dist/index.html"), first);
    assert_eq!(first.matches(JS_TAG).count(), 1);
    assert_eq!(first.matches(CSS_TAG).count(), 1);
}

/// Test: Help
/// Given any project
/// When the default task runs
/// Then nothing is built
#[tokio::test]
async fn test_default_task_builds_nothing() {
    let project = TestProject::new();
    assert_ok!(project.runner(BuildMode::Development).run("default").await);
    assert!(!project.exists("dist"));
}

// ============================================================================
// Fonts
// ============================================================================

/// Test: Font copy
/// Given installed icon fonts
/// When fonts runs
/// Then the matching files are copied unchanged
#[tokio::test]
async fn test_fonts_copied_unchanged() {
    let project = TestProject::new();
    project.write(
        "node_modules/font-awesome/fonts/fontawesome-webfont.woff",
        "wOFF-binary",
    );
    project.write("node_modules/font-awesome/fonts/fontawesome-webfont.ttf", "ttf");
    project.write("node_modules/font-awesome/fonts/FontAwesome.otf", "otf");

    assert_ok!(project.runner(BuildMode::Development).run("fonts").await);

    assert_eq!(
        project.list("dist/fonts"),
        vec!["fontawesome-webfont.ttf", "fontawesome-webfont.woff"]
    );
    assert_eq!(project.read("dist/fonts/fontawesome-webfont.woff"), "wOFF-binary");
}

/// Test: No fonts installed
/// Given no icon fonts
/// When fonts runs
/// Then it succeeds without creating anything
#[tokio::test]
async fn test_fonts_without_matches() {
    let project = TestProject::new();
    assert_ok!(project.runner(BuildMode::Development).run("fonts").await);
    assert!(!project.exists("dist/fonts"));
}
