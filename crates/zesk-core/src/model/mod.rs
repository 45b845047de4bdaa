//! Model runtime: member values, column coercion and instances.

pub mod codec;
mod instance;
mod member;

pub use instance::{ModelInstance, RegisterStatus};
pub use member::Member;
