pub(crate) mod store;
pub(crate) mod types;
pub(crate) mod worker;

pub(crate) use store::{JobQueue, PgJobQueue};
pub(crate) use types::{JobType, NewJob, QueuedJob};
pub(crate) use worker::WorkerPool;

#[cfg(test)]
pub(crate) mod memory;
