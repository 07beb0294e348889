//! # camhub-domain
//!
//! Pure domain model for the camhub surveillance bridge.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Sessions** and **Credentials** (the authenticated link to a
//!   recording station)
//! - Define **Rules** (the fixed set of event rules registered on the
//!   recorder) and the matching model used to reconcile them
//! - Define the **recorder wire protocol** (api names, methods, versions,
//!   event codes, response envelope) that must be reproduced exactly
//! - Define **Events** (session/capability change records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod credential;
pub mod device;
pub mod event;
pub mod protocol;
pub mod rule;
pub mod session;
