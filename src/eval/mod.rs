//! Expression-evaluation collaborator contracts.
//!
//! The expression language itself lives outside this crate; the gateway only
//! needs two seams. An [`ExpressionEvaluator`] resolves single attribute
//! values (origin, hostname) against a live request, and a
//! [`ContextEvaluator`] lets configured expressions mutate headers and bodies
//! before transmission and after the upstream response arrives. Evaluation
//! may perform I/O (e.g. loading claims), hence the async contract.

use async_trait::async_trait;
use axum::http::{Request, Response};
use bytes::Bytes;
use thiserror::Error;

/// Failure while evaluating a configured expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Resolves a raw attribute value against the request-scoped context.
///
/// Literals pass through unchanged; dynamic expressions are the evaluator's
/// business. Errors abort the exchange and are surfaced, never retried.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, raw: &str, req: &Request<Bytes>) -> Result<String, EvalError>;
}

/// Evaluator treating every attribute as a literal. The default when no
/// expression engine is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralEvaluator;

impl ExpressionEvaluator for LiteralEvaluator {
    fn evaluate(&self, raw: &str, _req: &Request<Bytes>) -> Result<String, EvalError> {
        Ok(raw.to_string())
    }
}

/// Applies configured request/response context expressions in place.
#[async_trait]
pub trait ContextEvaluator: Send + Sync {
    async fn evaluate_request(&self, req: &mut Request<Bytes>) -> Result<(), EvalError>;

    async fn evaluate_response(&self, resp: &mut Response<Bytes>) -> Result<(), EvalError>;
}
