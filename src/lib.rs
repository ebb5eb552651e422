//! Subscription Core - lifecycle coordination for paid app subscriptions
//!
//! This crate receives store notifications from Stripe, Apple and Google,
//! records each one exactly once, and drives subscriptions through their
//! grace, dunning and winback states with a durable priority task queue.
//! Sessions use rotating JWT pairs checked against a fail-closed revocation
//! list; every route sits behind a token-bucket rate limiter.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
