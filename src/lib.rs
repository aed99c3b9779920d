//! reelcast - Automated audiobook + cooking video production
//!
//! Turns story text into a narrated video: speech synthesis, ffmpeg
//! composition over a background image and a looped cooking clip, a generated
//! thumbnail and an optional YouTube upload, sequenced by one pipeline.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod speech;
pub mod thumbnail;
pub mod upload;
pub mod workflow;
