//! algobattle execution core
//!
//! This crate provides what the battle loop needs to run programs safely:
//! - The problem contract: starting size, parsing and verification
//! - A crash-safe interrupt guard that kills spawned containers on Ctrl-C
//! - A container runner and a single-round driver built on both

pub mod config;
pub mod container;
pub mod error;
pub mod guard;
pub mod problem;
pub mod round;
