//! Contract between the scheduler and the extraction jobs.
//!
//! A job is described statically by [`JobDescriptor`] (what it consumes and
//! produces) and instantiated at runtime as a `Box<dyn Job>` bound to a
//! [`JobContext`]. Optional capabilities are exposed through capability
//! queries ([`Job::as_filterable`], [`Job::as_reorgable`]) instead of a class
//! hierarchy.

mod context;
mod descriptor;
mod filter;

pub use context::{BlockRange, ExecutionPass, JobContext, JobSettings};
pub use descriptor::{JobDescriptor, JobFactory, StaticJob};
pub use filter::DataFilter;

use crate::error::JobError;
use async_trait::async_trait;

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Gather raw inputs, possibly via RPC or from the shared buffer.
    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError>;

    /// Derive output entities and append them to the shared buffer.
    async fn process(&mut self, pass: &ExecutionPass) -> Result<(), JobError>;

    /// One attempt of the job over the pass range.
    async fn run(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.collect(pass).await?;
        self.process(pass).await
    }

    fn as_filterable(&self) -> Option<&dyn Filterable> {
        None
    }

    fn as_reorgable(&mut self) -> Option<&mut dyn Reorgable> {
        None
    }
}

/// Job able to narrow what raw data upstream fetch jobs retrieve.
pub trait Filterable {
    fn filter(&self) -> DataFilter;
}

/// Job whose state can be rolled back when a chain reorganisation
/// invalidates blocks starting at `from_block`.
pub trait Reorgable {
    fn revert(&mut self, from_block: u64);
}
