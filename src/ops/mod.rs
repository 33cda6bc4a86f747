pub mod animation;
pub mod batch;
