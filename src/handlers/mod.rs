// src/handlers/mod.rs

pub mod admin;
pub mod admin_content;
pub mod admin_exams;
pub mod admin_payments;
pub mod attempt;
pub mod auth;
pub mod catalog;
pub mod content;
pub mod payment;
pub mod profile;
pub mod webhook;
