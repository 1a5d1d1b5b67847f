//! `nodes` crate: the node executor contract and every built-in executor.
//!
//! The engine dispatches each node through [`NodeExecutor`]. Built-in node
//! kinds implement [`NodeHandler`] and are wrapped in [`Guarded`], which
//! validates configuration and publishes status around the effect. Side
//! effects go through the collaborators defined here: [`StepRunner`] for
//! memoized steps and durable sleep, [`HttpClient`], [`ProviderGateway`]
//! and [`TemplateRenderer`].

pub mod builtin;
pub mod context;
pub mod error;
pub mod http;
pub mod integrations;
pub mod mock;
pub mod schedule;
pub mod step;
pub mod template;
pub mod traits;
pub mod types;
pub mod validate;

pub use context::Context;
pub use error::NodeError;
pub use http::{HttpClient, ReqwestHttpClient};
pub use integrations::{AiProvider, ProviderGateway, UnconfiguredGateway};
pub use schedule::{CompiledSchedule, CronSchedule, ScheduleError};
pub use step::{MemoryStepRunner, MemorySubstrate, StepRunner, StepSubstrate};
pub use template::{BraceRenderer, TemplateRenderer};
pub use traits::{Guarded, Invocation, NodeExecutor, NodeHandler, StatusSink};
pub use types::{NodeStatus, NodeType};
