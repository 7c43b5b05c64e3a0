//! Building blocks shared by the digitisation and video pipelines.
//!
//! ## Data Flow
//!
//! ```text
//! note photo ──▶ encode ──▶ (extractor) ──▶ repair ──▶ NotePage
//!
//! section ──▶ assets ──▶ media (clip) ──▶ media (concat) ──▶ final video
//!          (image ∥ audio)
//! ```
//!
//! 1. [`encode`] — PNG-encode and base64-wrap a source photo for the request body
//! 2. [`repair`] — locate the `{Description, Images}` object in a response
//! 3. [`assets`] — generate (or reuse) one section's image and narration
//! 4. [`media`]  — encode clips and join them; the only stage that runs
//!    external processes

pub mod assets;
pub mod encode;
pub mod media;
pub mod repair;
