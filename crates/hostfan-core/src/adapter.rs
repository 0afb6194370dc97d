//! Call-shape adapter
//!
//! Work items are either bare values or fixed-arity tuples. Bare values are
//! wrapped into one-tuples so every operation is invoked by unpacking
//! positional arguments:
//!
//! ```text
//! "node-a"                 -> op("node-a")
//! ("node-a", "sdb", path)  -> op("node-a", "sdb", path)
//! ```
//!
//! Free operations implement [`HostFn`]; operations that need the owning
//! orchestrator implement [`BoundHostFn`] and receive it as their first
//! argument. Both are implemented for plain `Fn` closures and functions
//! returning a future of `Result<T, E>`, for one to four arguments.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::HostConfig;
use crate::error::BoxError;

/// Future produced by one unit of work
pub type UnitFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'static>>;

/// One element of a fan-out batch
pub trait WorkItem: Send + 'static {
    /// Positional arguments the item expands to
    type Args: Send + 'static;

    /// Expand into positional arguments
    fn into_args(self) -> Self::Args;
}

/// Marks an arbitrary value as a single argument
///
/// Use it for item types that have no [`WorkItem`] impl of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar<T>(pub T);

impl<T: Send + 'static> WorkItem for Scalar<T> {
    type Args = (T,);

    fn into_args(self) -> Self::Args {
        (self.0,)
    }
}

macro_rules! tuple_work_item {
    ($($ty:ident),+) => {
        impl<$($ty: Send + 'static),+> WorkItem for ($($ty,)+) {
            type Args = Self;

            fn into_args(self) -> Self::Args {
                self
            }
        }
    };
}

tuple_work_item!(A);
tuple_work_item!(A, B);
tuple_work_item!(A, B, C);
tuple_work_item!(A, B, C, D);

macro_rules! scalar_work_item {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl WorkItem for $ty {
                type Args = (Self,);

                fn into_args(self) -> Self::Args {
                    (self,)
                }
            }
        )+
    };
}

scalar_work_item!(
    String,
    &'static str,
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
    SocketAddr,
    PathBuf,
    HostConfig,
    serde_json::Value,
);

/// An operation that does not need the owner
pub trait HostFn<Args>: Send + Sync + 'static {
    /// Successful result of one unit
    type Output: Send + 'static;

    /// Start the operation for one item
    fn call(&self, args: Args) -> UnitFuture<Self::Output>;
}

/// An operation that receives the owner as its first argument
pub trait BoundHostFn<O, Args>: Send + Sync + 'static {
    /// Successful result of one unit
    type Output: Send + 'static;

    /// Start the operation for one item
    fn call(&self, owner: Arc<O>, args: Args) -> UnitFuture<Self::Output>;
}

macro_rules! host_fn {
    ($($ty:ident),+) => {
        impl<Func, Fut, T, E, $($ty,)+> HostFn<($($ty,)+)> for Func
        where
            Func: Fn($($ty),+) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<T, E>> + Send + 'static,
            T: Send + 'static,
            E: Into<BoxError>,
        {
            type Output = T;

            #[allow(non_snake_case)]
            fn call(&self, ($($ty,)+): ($($ty,)+)) -> UnitFuture<T> {
                let fut = (self)($($ty),+);
                Box::pin(async move { fut.await.map_err(Into::into) })
            }
        }

        impl<O, Func, Fut, T, E, $($ty,)+> BoundHostFn<O, ($($ty,)+)> for Func
        where
            Func: Fn(Arc<O>, $($ty),+) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<T, E>> + Send + 'static,
            T: Send + 'static,
            E: Into<BoxError>,
        {
            type Output = T;

            #[allow(non_snake_case)]
            fn call(&self, owner: Arc<O>, ($($ty,)+): ($($ty,)+)) -> UnitFuture<T> {
                let fut = (self)(owner, $($ty),+);
                Box::pin(async move { fut.await.map_err(Into::into) })
            }
        }
    };
}

host_fn!(A);
host_fn!(A, B);
host_fn!(A, B, C);
host_fn!(A, B, C, D);
