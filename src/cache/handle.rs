//! Result Handle Module
//!
//! The shared, cloneable future that the cache hands out for each key.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};

// == Result Handle ==
/// A pending or settled computation shared by every caller of one cache entry.
///
/// Awaiting a handle yields a clone of the computation's result. All clones
/// of a handle observe the same single computation.
pub struct ResultHandle<T, E> {
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> ResultHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wraps a computation so that it can be awaited by many callers.
    pub fn new<F>(computation: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: computation.boxed().shared(),
        }
    }

    /// Returns the result if the computation has settled.
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.inner.peek()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }

    /// Whether both handles refer to the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T, E> Clone for ResultHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Future for ResultHandle<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T, E> fmt::Debug for ResultHandle<T, E>
where
    T: fmt::Debug + Clone + Send + Sync + 'static,
    E: fmt::Debug + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("settled", &self.peek())
            .finish()
    }
}
