// tests/action_kinds.rs

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use pipeworks::dag::Graph;
use pipeworks::engine::{Runner, RunnerOptions};
use pipeworks::errors::PipeworksError;
use pipeworks::exec::{from_callback, from_fn, from_future, from_stream};
use pipeworks_test_utils::recorder::Recorder;
use pipeworks_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn sequential(graph: Graph) -> Runner {
    Runner::new(graph).with_options(RunnerOptions {
        max_parallel: Some(1),
    })
}

#[tokio::test]
async fn every_completion_style_gates_its_dependents() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let mut graph = Graph::new();
    {
        let hits = Arc::clone(&hits);
        graph.register(
            "sync",
            Vec::<String>::new(),
            from_fn(move |_ctx| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }
    {
        let hits = Arc::clone(&hits);
        graph.register(
            "callback",
            ["sync"],
            from_callback(move |_ctx, done| {
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    hits.fetch_add(1, Ordering::SeqCst);
                    done.ok();
                });
            }),
        );
    }
    {
        let hits = Arc::clone(&hits);
        graph.register(
            "stream",
            ["callback"],
            from_stream(move |_ctx| {
                hits.fetch_add(1, Ordering::SeqCst);
                stream::iter(vec![Ok::<_, anyhow::Error>("a.png"), Ok("b.png")])
            }),
        );
    }
    {
        let hits = Arc::clone(&hits);
        graph.register(
            "future",
            ["stream"],
            from_future(move |_ctx| {
                let hits = Arc::clone(&hits);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }
            }),
        );
    }
    graph.register("last", ["future"], rec.action("last"));

    let report = with_timeout(sequential(graph).run(&["last"])).await?;
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(report.executed, vec!["sync", "callback", "stream", "future", "last"]);
    Ok(())
}

#[tokio::test]
async fn callback_failure_aborts_the_run() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let mut graph = Graph::new();
    graph
        .register(
            "karma",
            Vec::<String>::new(),
            from_callback(|_ctx, done| done.fail(anyhow::anyhow!("2 specs failed"))),
        )
        .register("next", ["karma"], rec.action("next"));

    let err = with_timeout(sequential(graph).run(&["next"])).await.unwrap_err();
    match err {
        PipeworksError::TaskFailed { name, cause } => {
            assert_eq!(name, "karma");
            assert_eq!(cause.to_string(), "2 specs failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(rec.started().is_empty());
    Ok(())
}

#[tokio::test]
async fn dropped_callback_handle_is_a_failure() -> TestResult {
    init_tracing();
    let mut graph = Graph::new();
    graph.register(
        "forgetful",
        Vec::<String>::new(),
        from_callback(|_ctx, done| drop(done)),
    );

    let err = with_timeout(Runner::new(graph).run(&["forgetful"])).await.unwrap_err();
    assert!(err.to_string().contains("dropped its completion handle"));
    Ok(())
}

#[tokio::test]
async fn first_stream_error_wins() -> TestResult {
    init_tracing();
    let mut graph = Graph::new();
    graph.register(
        "imagemin",
        Vec::<String>::new(),
        from_stream(|_ctx| {
            stream::iter(vec![
                Ok("logo.png"),
                Err(anyhow::anyhow!("corrupt header in hero.jpg")),
                Err(anyhow::anyhow!("second error")),
            ])
        }),
    );

    let err = with_timeout(Runner::new(graph).run(&["imagemin"])).await.unwrap_err();
    assert!(err.to_string().contains("corrupt header in hero.jpg"));
    Ok(())
}

#[tokio::test]
async fn empty_stream_succeeds() -> TestResult {
    init_tracing();
    let mut graph = Graph::new();
    graph.register(
        "nothing",
        Vec::<String>::new(),
        from_stream(|_ctx| stream::iter(Vec::<anyhow::Result<()>>::new())),
    );

    with_timeout(Runner::new(graph).run(&["nothing"])).await?;
    Ok(())
}
