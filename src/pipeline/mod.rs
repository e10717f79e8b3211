//! Pipeline stages for PDF-to-JSON conversion of one standard.
//!
//! Each submodule implements one step; [`crate::run`] drives them in order.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ extract ──▶ build ──▶ write
//! (filename)   (service)   (validate) (<id>.json)
//!                 ▲
//!       upload ───┘  inspect ──▶ build (physical page count)
//! ```
//!
//! 1. [`discover`]: list the input directory, parse standard numbers, assign IDs
//! 2. [`upload`]  : choose inline vs. hosted reference by file size
//! 3. [`extract`] : call the service with bounded retries
//! 4. [`inspect`] : count physical pages for the builder's cross-check
//! 5. [`build`]   : validate and normalise into a [`crate::output::StandardRecord`]
//! 6. [`write`]   : atomic whole-file JSON write

pub mod build;
pub mod discover;
pub mod extract;
pub mod inspect;
pub mod upload;
pub mod write;
