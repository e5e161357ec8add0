pub mod control;
pub mod dispatch;
pub mod engine;
pub mod hotkey;
pub mod keys;
pub mod logger;
pub mod platform;
pub mod recorder;
pub mod runtime;
pub mod script;
pub mod settings;
pub mod store;
pub mod types;
