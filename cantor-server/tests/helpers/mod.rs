//! Test helper utilities
//!
//! Shared by the cantor-server integration tests

#![allow(dead_code)]

pub mod app;
pub mod midi;

pub use app::{
    get, multipart, post_empty, post_json, send, simple_project_json, test_app, MultipartPart,
    TestApp,
};
pub use midi::{midi_file, VoiceSpec};
