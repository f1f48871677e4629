/// Profile Labeler - Chrome extension for labeling professional-network profiles
/// Built with Rust + WASM + Yew

pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod extension;
pub mod labels;
pub mod listeners;
pub mod mirror;
pub mod notes;
pub mod platform;
pub mod profiles;
pub mod protocol;
pub mod session;
pub mod slack;
pub mod store;
pub mod theme;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export profile id extraction for the content script
#[wasm_bindgen]
pub fn profile_id_from_url(url: &str, segment: &str) -> Option<String> {
    profiles::profile_id_from_url(url, segment)
}

// Start the Yew app for the side panel
#[wasm_bindgen]
pub fn start_side_panel() {
    yew::Renderer::<ui::panel::SidePanel>::new().render();
}

// Start the Yew app for the label manager page
#[wasm_bindgen]
pub fn start_label_manager() {
    yew::Renderer::<ui::labels::LabelManager>::new().render();
}
