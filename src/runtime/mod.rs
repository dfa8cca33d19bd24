//! Runtime system
//!
//! This module contains the cooperative scheduler and the clock and input
//! sources it polls.

pub mod clock;
pub mod input;
pub mod scheduler;
