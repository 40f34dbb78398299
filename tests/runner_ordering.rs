// tests/runner_ordering.rs

use std::error::Error;
use std::time::Duration;

use pipeworks::dag::Graph;
use pipeworks::engine::{Runner, RunnerOptions};
use pipeworks::exec::{from_fn, CleanAction};
use pipeworks_test_utils::recorder::Recorder;
use pipeworks_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} did not run; order was {order:?}"))
}

/// clean -> (images, styles) -> build
fn diamond(rec: &Recorder, delay: Duration) -> Graph {
    let mut graph = Graph::new();
    graph
        .register("clean", Vec::<String>::new(), rec.action("clean").delay(delay))
        .register("images", ["clean"], rec.action("images").delay(delay))
        .register("styles", ["clean"], rec.action("styles").delay(delay))
        .register_composite("build", ["images", "styles"]);
    graph
}

#[tokio::test]
async fn dependencies_complete_before_dependents() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let runner = Runner::new(diamond(&rec, Duration::from_millis(20)));

    let report = with_timeout(runner.run(&["build"])).await?;

    let started = rec.started();
    let finished = rec.finished();
    assert_eq!(started.len(), 3);
    assert!(position(&finished, "clean") < position(&started, "images"));
    assert!(position(&finished, "clean") < position(&started, "styles"));
    assert_eq!(report.executed.last().map(String::as_str), Some("build"));
    Ok(())
}

#[tokio::test]
async fn shared_dependency_runs_once_per_run() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let runner = Runner::new(diamond(&rec, Duration::ZERO));

    with_timeout(runner.run(&["build", "images", "build"])).await?;
    assert_eq!(rec.count("clean"), 1);
    assert_eq!(rec.count("images"), 1);

    // A second run starts from scratch.
    with_timeout(runner.run(&["images"])).await?;
    assert_eq!(rec.count("clean"), 2);
    assert_eq!(rec.count("styles"), 1);
    Ok(())
}

#[tokio::test]
async fn only_the_requested_closure_runs() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let runner = Runner::new(diamond(&rec, Duration::ZERO));

    let report = with_timeout(runner.run(&["styles"])).await?;
    assert_eq!(rec.started(), vec!["clean", "styles"]);
    assert_eq!(report.executed, vec!["clean", "styles"]);
    Ok(())
}

#[tokio::test]
async fn independent_tasks_overlap_when_unbounded() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let runner = Runner::new(diamond(&rec, Duration::from_millis(100)));

    with_timeout(runner.run(&["build"])).await?;
    assert_eq!(rec.max_running(), 2);
    Ok(())
}

#[tokio::test]
async fn max_parallel_one_is_strictly_sequential_in_plan_order() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let graph = diamond(&rec, Duration::from_millis(20));
    let runner = Runner::new(graph).with_options(RunnerOptions {
        max_parallel: Some(1),
    });

    let plan = runner.plan(&["build"])?;
    with_timeout(runner.run(&["build"])).await?;

    let expected: Vec<String> = plan
        .tasks()
        .iter()
        .filter(|t| t.as_str() != "build")
        .cloned()
        .collect();
    assert_eq!(rec.started(), expected);
    assert_eq!(rec.finished(), expected);
    assert_eq!(rec.max_running(), 1);
    Ok(())
}

#[tokio::test]
async fn clean_then_build_leaves_only_build_output() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let dist = tmp.path().join("dist/css");
    std::fs::create_dir_all(dist.join("old"))?;
    std::fs::write(dist.join("stale.css"), "old")?;
    std::fs::write(dist.join("old/legacy.css"), "old")?;

    let mut graph = Graph::new();
    graph
        .register("clean:css", Vec::<String>::new(), CleanAction::new(vec!["dist/css".into()]))
        .register(
            "styles",
            ["clean:css"],
            from_fn(|ctx| {
                std::fs::write(ctx.root().join("dist/css/styles.css"), "body{}")?;
                Ok(())
            }),
        );
    let runner = Runner::new(graph).with_root(tmp.path());

    with_timeout(runner.run(&["styles"])).await?;

    let mut left: Vec<String> = std::fs::read_dir(&dist)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_, _>>()?;
    left.sort();
    assert_eq!(left, vec!["styles.css"]);
    Ok(())
}
