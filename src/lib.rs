// Clevo RGB Backlight Driver - Shared Library
// Color engine, effect generators and screen sampling

pub mod color;
pub mod config;
pub mod effect;
pub mod engine;
pub mod params;
pub mod screen_capture;

pub use color::{HueWheel, Rgb};
pub use config::{CaptureRegion, DriverConfig, RestartPolicy};
pub use effect::EffectMode;
pub use engine::{Engine, EngineError, EngineEvents, LastColor, NullEvents};
pub use params::{ParamsDelta, SharedParams};
pub use screen_capture::{CaptureTool, ScreenSampler, SharedFrame};
