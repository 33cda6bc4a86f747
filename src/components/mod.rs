pub mod history;
pub mod layers;
pub mod presets;
