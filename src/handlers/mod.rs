// src/handlers/mod.rs

pub mod auth;
pub mod comment;
pub mod community;
pub mod feedback;
pub mod interaction;
pub mod notification;
pub mod oauth;
