//! Line-oriented terminal front end for the session client.

pub mod app;
pub mod cli;
pub mod error;
pub mod format;
pub mod input;
pub mod view;
