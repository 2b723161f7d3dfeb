// src/models/mod.rs

pub mod attempt;
pub mod automation;
pub mod content;
pub mod enrollment;
pub mod exam;
pub mod institution;
pub mod payment;
pub mod program;
pub mod question;
pub mod user;
