//! Data models for Encore

mod request;
mod settings;
mod song;

pub use request::{
    merge_key, LocalToken, NewRequest, Request, RequestId, RequestRef, RequestSource, Requester,
};
pub use settings::QueueSettings;
pub use song::Song;
