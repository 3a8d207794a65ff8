//! Jotty notes, checklists and tasks for a home-automation hub.
//!
//! [`app::Integration`] composes the pieces: a [`integrations::jotty::JottyClient`]
//! for transport, a [`runtime::Coordinator`] that polls it, the read-only
//! [`views`] and the [`actions::ActionDispatcher`].

pub mod actions;
pub mod app;
pub mod config;
pub mod integrations;
pub mod logging;
pub mod models;
pub mod runtime;
pub mod tree;
pub mod views;
