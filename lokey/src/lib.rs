//! Ambient runtime support for the `lokey_layer` keymap engine.
//!
//! This crate carries the parts of the `lokey` firmware framework that have
//! nothing to do with keymap semantics: a pub/sub notification channel, an
//! ISR-safe bounded queue, a hierarchical key-value settings store backed by
//! flash, and the locality/split-transport abstraction that lets a behavior
//! run on whichever physical half of a split keyboard it is supposed to.
//!
//! # Feature flags
//!
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]
//!

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod error;
pub mod settings;
pub mod split;
pub mod util;

pub use error::Error;
