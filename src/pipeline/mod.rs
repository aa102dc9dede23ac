//! Pipeline stages for diagram digitizing.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and a backend (renderer, model) can be swapped
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ llm ──▶ validate
//! (file)    (render +     (VLM +   (parse, hydrate,
//!            encode)       retry)   clamp)
//! ```
//!
//! 1. [`input`]     — read the file and determine its media type
//! 2. [`render`]    — rasterise page 1 of a PDF; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]    — JPEG-encode the rendered page, base64 and data-URL helpers
//! 4. [`normalize`] — combine 2 and 3 into one model-ready image; images pass through
//! 5. [`retry`]     — the retry policy object and its executor
//! 6. [`llm`]       — vision model backends and the two-tier invoker; the only
//!    stage with network I/O
//! 7. [`validate`]  — turn raw model text into typed components

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
pub mod retry;
pub mod validate;
