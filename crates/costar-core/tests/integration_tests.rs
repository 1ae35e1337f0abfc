//! Integration tests for costar-core.

#![allow(clippy::unwrap_used)]

mod common;
mod integration;
