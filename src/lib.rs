//! Telegram activity provider for task orchestration.
//!
//! Turns a Telegram bot into the activities a host task system calls:
//! interactive button validation over single images, media groups or plain
//! text, plus best-effort send/edit/delete and "wait for the next message".
//!
//! See `DESIGN.md` for the module map and design decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod events;
pub mod gateway;

pub mod messaging;
pub mod render;
pub mod validation;

pub mod activities;
pub mod host;
