//! A load generator that replays recorded serverless workload traces against a live platform.
//!
//! Each function of the trace gets its own [`driver::FunctionDriver`] that fires invocations with the
//! inter-arrival times of a [`specification::FunctionSpecification`], while [`collector`] persists the
//! outcome records of all drivers. [`experiment::Experiment`] wires everything together.
//!
//! The invoked platform, the deployment step and cluster scraping are pluggable through the
//! [`invoker::Invoker`], [`deployer::Deployer`] and [`scrapper::ClusterScraper`] traits.

pub mod collector;
pub mod config;
pub mod deployer;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod experiment;
pub mod extra;
pub mod function;
pub mod generator;
pub mod invocation;
pub mod invoker;
pub mod metric;
pub mod output;
pub mod policy;
pub mod scrapper;
pub mod specification;
pub mod stats;
pub mod timekeeper;
pub mod util;
