pub mod service;

pub use service::{
    close_session, doctor, get_session, open_directory, poll_organize_events, rescan,
    start_organization, OpenDirectoryRequest, SessionSnapshot,
};
