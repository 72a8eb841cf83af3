pub mod settings;

pub use settings::{Settings, GLOBAL_SETTINGS};
