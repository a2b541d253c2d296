//! Layer management for the lokey framework.
//!
//! Owns the keymap engine: the behavior registry, parameter validator,
//! matrix transform, physical-layout manager, scan pipeline, layer state
//! and overlay, key/sensor dispatch, persistence glue, and the wire-facing
//! RPC message schema.
//!
//! # Feature flags
//!
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]
//!

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod behavior;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod keymap;
pub mod matrix;
pub mod persistence;
pub mod physical_layout;
pub mod registry;
pub mod rpc;
pub mod scan;
pub mod sensor;
pub mod validator;

pub use config::KeymapConfig;
pub use engine::KeymapEngine;
