//! Evidence-grounded repository question answering.
//!
//! The pipeline: [`index`] turns a repository snapshot into citable
//! chunks, [`retriever`] ranks them deterministically, [`gateway`]
//! exposes the closed tool vocabulary, and [`orchestrator`] drives the
//! classify/plan/execute/synthesize loop against a [`oracle`] reasoning
//! engine, collecting citations in an [`evidence`] store along the way.

pub mod cli;
pub mod config;
pub mod constants;
pub mod env;
pub mod evidence;
pub mod fetch;
pub mod gateway;
pub mod index;
pub mod models;
pub mod oracle;
pub mod orchestrator;
pub mod output;
pub mod retriever;
pub mod session;
