// tests/demo_pipeline.rs

#![cfg(unix)]

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use pipeworks::config::{config_root_dir, load_and_validate};
use pipeworks::engine::{Runner, RunnerOptions};
use pipeworks::errors::PipeworksError;
use pipeworks::pipeline::Pipeline;
use pipeworks::types::ReloadKind;
use pipeworks::watch::{compile_rules, WatchDispatcher};
use pipeworks_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const PIPELINE: &str = r#"
[config]
max_parallel = 2

[task."clean:css"]
clean = ["dist/css"]

[task."clean:img"]
clean = ["dist/img"]

[task.sass]
cmd = "mkdir -p .tmp/css && for f in app/styles/*.scss; do cp \"$f\" .tmp/css/$(basename \"$f\" .scss).css; done"

[task.styles]
after = ["clean:css", "sass"]
cmd = "mkdir -p dist/css && cat .tmp/css/*.css > dist/css/styles.css"
reload = "css"

[task.images]
after = ["clean:img"]
cmd = "mkdir -p dist/img && cp app/images/* dist/img/"
reload = "page"

[task.lint]
cmd = "grep -q 'color' app/styles/main.scss"

[task.dev]
after = ["styles", "images"]

[[task.dev.watch]]
patterns = ["app/styles/**"]
tasks = ["styles"]

[[task.dev.watch]]
patterns = ["app/images/**"]
tasks = ["images"]

[task.build]
after = ["lint", "styles", "images"]
"#;

fn project() -> Result<tempfile::TempDir, Box<dyn Error>> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    std::fs::create_dir_all(root.join("app/styles"))?;
    std::fs::create_dir_all(root.join("app/images"))?;
    std::fs::create_dir_all(root.join("dist/css"))?;
    std::fs::write(root.join("app/styles/main.scss"), "body { color: red; }\n")?;
    std::fs::write(root.join("app/images/logo.png"), "png")?;
    std::fs::write(root.join("dist/css/stale.css"), "old")?;
    std::fs::write(root.join("Pipeworks.toml"), PIPELINE)?;
    Ok(tmp)
}

fn runner_for(root: &Path) -> Result<(Runner, Pipeline, pipeworks::config::ConfigFile), Box<dyn Error>> {
    let config_path = root.join("Pipeworks.toml");
    let cfg = load_and_validate(&config_path)?;
    let pipeline = Pipeline::from_config(&cfg)?;
    let runner = Runner::new(pipeline.graph())
        .with_root(config_root_dir(&config_path))
        .with_options(RunnerOptions {
            max_parallel: cfg.max_parallel(),
        });
    Ok((runner, pipeline, cfg))
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn build_produces_only_fresh_output() -> TestResult {
    init_tracing();
    let tmp = project()?;
    let root = tmp.path();
    let (runner, pipeline, _) = runner_for(root)?;

    let report = with_timeout(runner.run(&["build"])).await?;
    assert!(report.tolerated_failures.is_empty());
    assert_eq!(listing(&root.join("dist/css")), vec!["styles.css"]);
    assert_eq!(listing(&root.join("dist/img")), vec!["logo.png"]);
    assert_eq!(
        std::fs::read_to_string(root.join("dist/css/styles.css"))?,
        "body { color: red; }\n"
    );

    let plan = runner.plan(&["build"])?;
    assert!(pipeline.watch_rules_for(&plan).is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_lint_aborts_the_build() -> TestResult {
    init_tracing();
    let tmp = project()?;
    let root = tmp.path();
    std::fs::write(root.join("app/styles/main.scss"), "body {}\n")?;
    let (runner, _, _) = runner_for(root)?;

    let err = with_timeout(runner.run(&["build"])).await.unwrap_err();
    match err {
        PipeworksError::TaskFailed { name, .. } => assert_eq!(name, "lint"),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn dev_watch_rules_rebuild_and_signal_reload() -> TestResult {
    init_tracing();
    let tmp = project()?;
    let root = tmp.path();
    let (runner, pipeline, cfg) = runner_for(root)?;

    with_timeout(runner.run(&["dev"])).await?;
    let plan = runner.plan(&["dev"])?;
    let rules = compile_rules(pipeline.watch_rules_for(&plan))?;
    assert_eq!(rules.len(), 2);

    let mut reloads = runner.reload_hub().subscribe();
    let dispatcher = WatchDispatcher::new(root, rules, runner.clone(), cfg.watch_overlap());

    std::fs::write(root.join("app/styles/extra.scss"), "h1 { margin: 0; }\n")?;
    let changed = vec![root.join("app/styles/extra.scss")];
    with_timeout(join_all(dispatcher.handle_batch(&changed))).await;

    let css = std::fs::read_to_string(root.join("dist/css/styles.css"))?;
    assert!(css.contains("margin: 0"));
    assert!(css.contains("color: red"));
    assert_eq!(
        with_timeout(reloads.recv()).await?,
        ReloadKind::Css
    );

    // An image change only re-runs the image pipeline.
    std::fs::write(root.join("app/images/icon.png"), "png")?;
    let changed = vec![root.join("app/images/icon.png")];
    with_timeout(join_all(dispatcher.handle_batch(&changed))).await;
    assert_eq!(listing(&root.join("dist/img")), vec!["icon.png", "logo.png"]);
    assert_eq!(with_timeout(reloads.recv()).await?, ReloadKind::Page);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(reloads.try_recv().is_err());
    Ok(())
}
