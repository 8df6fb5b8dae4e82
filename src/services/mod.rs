// src/services/mod.rs

pub mod bank;
pub mod grading;
pub mod live;
pub mod paper;
pub mod rooms;
