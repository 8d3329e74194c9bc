/// Completion callback handed to an [`AsyncApi`] implementation
///
/// Boxed so that implementations can move it onto whatever thread or task eventually
/// finishes the work.
pub type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Handle returned by [`AsyncApi::operation`] to stop the underlying work
///
/// `cancel` consumes the handle, so it runs at most once. It may block for as long as
/// the teardown takes and must be a no-op if the operation already resolved.
pub trait CancelHandle: Send + 'static {
    fn cancel(self: Box<Self>);
}

/// Callback-based asynchronous operation wrapped by the sync adapter
///
/// Contract the adapter relies on:
/// - at most one of `on_success` / `on_error` is invoked, at most once, from any
///   thread (including synchronously, before `operation` returns)
/// - after a successful `cancel`, invoking neither callback is acceptable
///
/// # Example
///
/// ```rust
/// use sync_facade_common::{AsyncApi, Callback, NoopCancel};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("negative input")]
/// struct Negative;
///
/// struct Times10;
///
/// impl AsyncApi for Times10 {
///     type Param = i32;
///     type Output = i32;
///     type Error = Negative;
///     type Handle = NoopCancel;
///
///     fn operation(
///         &self,
///         param: i32,
///         on_success: Callback<i32>,
///         on_error: Callback<Negative>,
///     ) -> Self::Handle {
///         std::thread::spawn(move || {
///             if param < 0 { on_error(Negative) } else { on_success(param * 10) }
///         });
///         NoopCancel
///     }
///
///     fn name(&self) -> &str {
///         "times10"
///     }
/// }
/// ```
pub trait AsyncApi: Send + Sync {
    type Param;
    type Output: Send + 'static;
    type Error: std::error::Error + Send + 'static;
    type Handle: CancelHandle;

    /// Starts the operation and returns immediately with its cancel handle
    fn operation(
        &self,
        param: Self::Param,
        on_success: Callback<Self::Output>,
        on_error: Callback<Self::Error>,
    ) -> Self::Handle;

    /// Short name used in logs and metric labels
    fn name(&self) -> &str;
}

/// [`CancelHandle`] backed by a closure
pub struct CancelFn<F>(F);

/// Wraps a closure into a [`CancelHandle`]
pub fn cancel_fn<F>(f: F) -> CancelFn<F>
where
    F: FnOnce() + Send + 'static,
{
    CancelFn(f)
}

impl<F> CancelHandle for CancelFn<F>
where
    F: FnOnce() + Send + 'static,
{
    fn cancel(self: Box<Self>) {
        let CancelFn(f) = *self;
        f()
    }
}

/// Handle for operations that cannot be interrupted
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCancel;

impl CancelHandle for NoopCancel {
    fn cancel(self: Box<Self>) {}
}

impl<F> std::fmt::Debug for CancelFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelFn")
    }
}
