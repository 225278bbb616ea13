//! Pipeline stages for headshot upload and batch generation.
//!
//! Each submodule implements exactly one step. None of them keeps state
//! between calls; the wizard in [`crate::wizard`] owns the session.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ normalize ──▶ request ──▶ (service) ──▶ materialize ──▶ download
//! (size/type)  (HEIC→PNG)    (prompt,n)               (ids, urls)      (throttled)
//! ```
//!
//! 1. [`validate`]    — size and media-type checks on a picked file
//! 2. [`normalize`]   — decode HEIC/HEIF and re-encode via [`encode`]; runs
//!    in `spawn_blocking` because decoding is CPU-bound
//! 3. [`request`]     — compose the prompt and clamp the batch size
//! 4. [`materialize`] — attach ids and provenance to raw service results
//! 5. [`download`]    — sequential, throttled saves of selected artifacts

pub mod download;
pub mod encode;
pub mod materialize;
pub mod normalize;
pub mod request;
pub mod validate;
