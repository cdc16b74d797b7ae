pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{decode, encode, Message};
pub use paths::Paths;
pub use types::{
    ActionDetail, ActionKind, AnnotatedAction, Annotations, ElementDescriptor, InteractedElement,
    Mode,
};
