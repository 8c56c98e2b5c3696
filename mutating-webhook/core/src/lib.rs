#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod object;
pub mod patch;

pub use self::object::{
    DynamicReconstructor, Object, Reconstruct, ResourceType, StaticReconstructor,
};
pub use json_patch::Patch;
