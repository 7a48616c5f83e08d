//! # gridq
//!
//! Test harness for a distributed task grid. A producer loads integers into
//! a Redis list, consumer instances drain it squaring each item into an
//! output list, and a monitor watches both lists.
//!
//! The consumer's drain loop ([`consumer::Consumer`]) is the part with real
//! behavior: it tells "no work right now" apart from "done", and rides out
//! transient queue store failures.

pub mod config;
pub mod consumer;
pub mod demo;
pub mod error;
pub mod monitor;
pub mod producer;
pub mod queue;
pub mod telemetry;
