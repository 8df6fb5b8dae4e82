// src/handlers/mod.rs

pub mod exam;
pub mod live;
pub mod rooms;
