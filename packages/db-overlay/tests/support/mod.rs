#![allow(dead_code)]

pub mod logging;
pub mod models;

pub use models::{
    item_model, item_names, items_fixture, original_with, overlay_options, rec, user_model,
};
