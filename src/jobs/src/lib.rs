//! Completion tracking for asynchronous jobs.
//!
//! A [`JobExecutor`] counts the jobs started through it and lets any number of threads block until
//! that count drops back to zero. Jobs run on a [`JobDispatcher`] reached through a [`JobContext`];
//! the executor itself never runs anything. A single post job can be chained onto an executor and is
//! started on another executor once every job of the first one has reported completion.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod executor;
pub mod unit;

pub mod prelude {
	pub use crate::{
		config::PoolConfig,
		dispatch::{InlineDispatcher, JobContext, JobDispatcher, WorkerPool},
		error::Error,
		event::{CompletionBus, CompletionListener, EventBus, Subscription},
		executor::{CompletionFence, ExecutorId, JobExecutor},
		unit::TrackedUnit,
	};
}

pub use prelude::*;
