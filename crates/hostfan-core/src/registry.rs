//! Named operations invoked with JSON arguments
//!
//! Configuration-driven callers cannot name a Rust closure, so operations are
//! registered under a name with a fixed arity and a fixed shape: free, or
//! bound to the owner. A call passes a positional argument list that must be
//! exactly one JSON array, the batch. Each batch element that is an array is
//! unpacked as positional arguments; any other element is a single argument.
//! Shape errors are reported as `InvalidInvocation` before any unit runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, info_span};

use crate::adapter::WorkItem;
use crate::error::{BoxError, FanOutError};
use crate::fanout::{self, BatchFuture, BatchReport};
use crate::owner::PoolOwner;

/// Future returned by a registered operation
pub type DynFuture = Pin<Box<dyn Future<Output = Result<Value, BoxError>> + Send + 'static>>;

type FreeFn = Arc<dyn Fn(Vec<Value>) -> DynFuture + Send + Sync>;
type BoundFn<O> = Arc<dyn Fn(Arc<O>, Vec<Value>) -> DynFuture + Send + Sync>;

enum Callable<O> {
    Free(FreeFn),
    Bound(BoundFn<O>),
}

impl<O> Clone for Callable<O> {
    fn clone(&self) -> Self {
        match self {
            Callable::Free(f) => Callable::Free(Arc::clone(f)),
            Callable::Bound(f) => Callable::Bound(Arc::clone(f)),
        }
    }
}

struct Registered<O> {
    arity: usize,
    callable: Callable<O>,
}

/// Public description of a registered operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    /// Registered name
    pub name: String,
    /// Positional arguments per item
    pub arity: usize,
    /// Whether the owner is passed first
    pub bound: bool,
}

/// Positional arguments of one batch item
///
/// Renders as compact JSON in logs.
#[derive(Clone, PartialEq)]
pub struct JsonArgs(pub Vec<Value>);

impl fmt::Debug for JsonArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("(")?;
        for arg in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl WorkItem for JsonArgs {
    type Args = (Vec<Value>,);

    fn into_args(self) -> Self::Args {
        (self.0,)
    }
}

/// Split a positional argument list into batch items
///
/// # Errors
/// `InvalidInvocation` unless `args` is exactly one array whose elements all
/// expand to `arity` arguments.
pub fn normalize_call(args: Vec<Value>, arity: usize) -> Result<Vec<JsonArgs>, FanOutError> {
    let [batch]: [Value; 1] = args.try_into().map_err(|args: Vec<Value>| {
        FanOutError::InvalidInvocation(format!(
            "expected exactly one positional argument (the batch), got {}",
            args.len()
        ))
    })?;

    let items = match batch {
        Value::Array(items) => items,
        other => {
            return Err(FanOutError::InvalidInvocation(format!(
                "batch must be an array, got {other}"
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let args = match item {
                Value::Array(args) => args,
                scalar => vec![scalar],
            };
            if args.len() == arity {
                Ok(JsonArgs(args))
            } else {
                Err(FanOutError::InvalidInvocation(format!(
                    "item {index} has {} arguments, operation takes {arity}",
                    args.len()
                )))
            }
        })
        .collect()
}

/// Registry of operations callable by name
pub struct OperationRegistry<O> {
    ops: HashMap<String, Registered<O>>,
}

impl<O> Default for OperationRegistry<O> {
    fn default() -> Self {
        Self {
            ops: HashMap::new(),
        }
    }
}

impl<O> fmt::Debug for OperationRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

impl<O: PoolOwner + Send + Sync + 'static> OperationRegistry<O> {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation that takes `arity` arguments per item
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_free<F, Fut>(&mut self, name: impl Into<String>, arity: usize, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let callable: FreeFn = Arc::new(move |args: Vec<Value>| -> DynFuture { Box::pin(f(args)) });
        self.ops.insert(
            name.into(),
            Registered {
                arity,
                callable: Callable::Free(callable),
            },
        );
    }

    /// Register an operation that receives the owner before its `arity` arguments
    pub fn register_bound<F, Fut>(&mut self, name: impl Into<String>, arity: usize, f: F)
    where
        F: Fn(Arc<O>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let callable: BoundFn<O> =
            Arc::new(move |owner: Arc<O>, args: Vec<Value>| -> DynFuture { Box::pin(f(owner, args)) });
        self.ops.insert(
            name.into(),
            Registered {
                arity,
                callable: Callable::Bound(callable),
            },
        );
    }

    /// Invoke `name` with a positional argument list, failing fast
    ///
    /// The call is validated before the returned future is first polled.
    ///
    /// # Errors
    /// `InvalidInvocation` for an unknown name or a malformed call, otherwise
    /// whatever [`fanout::dispatch`] returns.
    pub fn invoke<'a>(
        &self,
        owner: &'a Arc<O>,
        name: &'a str,
        args: Vec<Value>,
    ) -> BatchFuture<'a, Vec<Value>> {
        let prepared = self.prepare(name, args);
        let span = info_span!("invoke", operation = %name);
        Box::pin(
            async move {
                let (callable, items) = prepared?;
                match callable {
                    Callable::Free(f) => {
                        fanout::dispatch(&**owner, name, items, move |args: Vec<Value>| f(args))
                            .await
                    }
                    Callable::Bound(f) => {
                        fanout::dispatch_bound(
                            owner,
                            name,
                            items,
                            move |owner: Arc<O>, args: Vec<Value>| f(owner, args),
                        )
                        .await
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Invoke `name` with a positional argument list, reporting every slot
    ///
    /// # Errors
    /// `InvalidInvocation` for an unknown name or a malformed call,
    /// `NotInitialized` or `PoolClosed` if nothing could be submitted.
    pub fn invoke_settled<'a>(
        &self,
        owner: &'a Arc<O>,
        name: &'a str,
        args: Vec<Value>,
    ) -> BatchFuture<'a, BatchReport<Value>> {
        let prepared = self.prepare(name, args);
        let span = info_span!("invoke_settled", operation = %name);
        Box::pin(
            async move {
                let (callable, items) = prepared?;
                match callable {
                    Callable::Free(f) => {
                        fanout::dispatch_settled(&**owner, name, items, move |args: Vec<Value>| {
                            f(args)
                        })
                        .await
                    }
                    Callable::Bound(f) => {
                        fanout::dispatch_bound_settled(
                            owner,
                            name,
                            items,
                            move |owner: Arc<O>, args: Vec<Value>| f(owner, args),
                        )
                        .await
                    }
                }
            }
            .instrument(span),
        )
    }

    fn prepare(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<(Callable<O>, Vec<JsonArgs>), FanOutError> {
        let registered = self
            .ops
            .get(name)
            .ok_or_else(|| FanOutError::InvalidInvocation(format!("unknown operation: {name}")))?;
        let items = normalize_call(args, registered.arity)?;
        debug!(items = items.len(), arity = registered.arity, "call normalized");
        Ok((registered.callable.clone(), items))
    }
}

impl<O> OperationRegistry<O> {
    /// Registered operations sorted by name
    #[must_use]
    pub fn operations(&self) -> Vec<OperationInfo> {
        let mut ops: Vec<_> = self
            .ops
            .iter()
            .map(|(name, op)| OperationInfo {
                name: name.clone(),
                arity: op.arity,
                bound: matches!(op.callable, Callable::Bound(_)),
            })
            .collect();
        ops.sort_by(|a, b| a.name.cmp(&b.name));
        ops
    }

    /// Description of one operation
    #[must_use]
    pub fn describe(&self, name: &str) -> Option<OperationInfo> {
        self.operations().into_iter().find(|op| op.name == name)
    }
}
