pub(crate) mod bootstrap;
mod driver;
pub(crate) mod loop_runner;
mod metrics;
