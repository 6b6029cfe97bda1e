// src/models/mod.rs

pub mod comment;
pub mod feedback;
pub mod notification;
pub mod post;
pub mod user;
pub mod vote;
