// src/exec/action.rs

//! The single action abstraction every task runs through.
//!
//! An action is anything that can be started with a [`TaskContext`] and
//! returns a future resolving to `Ok(())` or an error. Different ways of
//! signalling completion are adapted onto that one shape:
//!
//! - [`from_fn`]: a plain synchronous function.
//! - [`from_callback`]: the action receives a [`Done`] handle and signals
//!   through it, possibly from another task or thread.
//! - [`from_stream`]: the action returns a stream; end of stream means
//!   success, the first error item means failure.
//! - [`from_future`]: an async function.
//! - [`noop`]: composite tasks that only aggregate dependencies.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;

use crate::engine::TaskName;
use crate::proxy::ReloadHub;

/// Boxed future returned by [`TaskAction::start`].
pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Everything an action can see about the invocation it belongs to.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskName,
    pub run_id: u64,
    pub root: Arc<PathBuf>,
    pub reload: ReloadHub,
}

impl TaskContext {
    /// Project root; relative paths in task definitions resolve against it.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A unit of work attached to a task.
pub trait TaskAction: Send + Sync {
    fn start(&self, ctx: TaskContext) -> ActionFuture;

    /// Short human-readable description for plan listings.
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<T: TaskAction + ?Sized> TaskAction for Arc<T> {
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        (**self).start(ctx)
    }

    fn describe(&self) -> Option<String> {
        (**self).describe()
    }
}

/// Action that does nothing and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl TaskAction for Noop {
    fn start(&self, _ctx: TaskContext) -> ActionFuture {
        Box::pin(std::future::ready(Ok(())))
    }
}

pub fn noop() -> Noop {
    Noop
}

pub struct FnAction<F> {
    f: F,
}

impl<F> TaskAction for FnAction<F>
where
    F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync,
{
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let result = (self.f)(&ctx);
        Box::pin(std::future::ready(result))
    }
}

/// Adapt a synchronous function. It runs when the action is started.
pub fn from_fn<F>(f: F) -> FnAction<F>
where
    F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    FnAction { f }
}

pub struct FutureAction<F> {
    f: F,
}

impl<F, Fut> TaskAction for FutureAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        Box::pin((self.f)(ctx))
    }
}

/// Adapt an async function.
pub fn from_future<F, Fut>(f: F) -> FutureAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FutureAction { f }
}

/// Completion handle passed to callback-style actions.
///
/// Consuming it with [`Done::ok`], [`Done::fail`] or [`Done::finish`]
/// completes the task. Dropping it without doing so fails the task.
pub struct Done {
    tx: oneshot::Sender<anyhow::Result<()>>,
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

impl Done {
    pub fn ok(self) {
        self.finish(Ok(()));
    }

    pub fn fail(self, err: impl Into<anyhow::Error>) {
        self.finish(Err(err.into()));
    }

    pub fn finish(self, result: anyhow::Result<()>) {
        // The receiver is gone only if the run loop itself went away.
        let _ = self.tx.send(result);
    }
}

pub struct CallbackAction<F> {
    f: F,
}

impl<F> TaskAction for CallbackAction<F>
where
    F: Fn(TaskContext, Done) + Send + Sync,
{
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let task = ctx.task.clone();
        let (tx, rx) = oneshot::channel();
        (self.f)(ctx, Done { tx });
        Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "task '{task}' dropped its completion handle without signalling"
                )),
            }
        })
    }
}

/// Adapt a callback-style function that signals through a [`Done`] handle.
pub fn from_callback<F>(f: F) -> CallbackAction<F>
where
    F: Fn(TaskContext, Done) + Send + Sync + 'static,
{
    CallbackAction { f }
}

pub struct StreamAction<F, T> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, S, T> TaskAction for StreamAction<F, T>
where
    F: Fn(TaskContext) -> S + Send + Sync,
    S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let stream = (self.f)(ctx);
        Box::pin(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                item?;
            }
            Ok(())
        })
    }
}

/// Adapt a function returning a stream of results.
///
/// The stream is drained; the first error item fails the task and
/// the rest of the stream is not polled.
pub fn from_stream<F, S, T>(f: F) -> StreamAction<F, T>
where
    F: Fn(TaskContext) -> S + Send + Sync + 'static,
    S: Stream<Item = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    StreamAction {
        f,
        _item: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn ctx() -> TaskContext {
        TaskContext {
            task: "t".into(),
            run_id: 7,
            root: Arc::new(PathBuf::from(".")),
            reload: ReloadHub::new(),
        }
    }

    #[tokio::test]
    async fn callback_dropping_done_is_a_failure() {
        let action = from_callback(|_ctx, done| drop(done));
        let err = action.start(ctx()).await.unwrap_err();
        assert!(err.to_string().contains("completion handle"));
    }

    #[tokio::test]
    async fn callback_may_complete_from_another_task() {
        let action = from_callback(|_ctx, done| {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                done.ok();
            });
        });
        action.start(ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn stream_stops_at_first_error() {
        let polled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&polled);
        let action = from_stream(move |_ctx| {
            let seen = Arc::clone(&seen);
            stream::iter(vec![Ok(1), Err(anyhow!("bad chunk")), Ok(3)]).inspect(move |_| {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
        });

        let err = action.start(ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad chunk");
        assert_eq!(polled.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_stream_succeeds() {
        let action = from_stream(|_ctx| stream::empty::<anyhow::Result<()>>());
        action.start(ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn sync_fn_sees_context() {
        let action = from_fn(|ctx| {
            anyhow::ensure!(ctx.run_id == 7, "wrong run id");
            Ok(())
        });
        action.start(ctx()).await.unwrap();
    }
}
