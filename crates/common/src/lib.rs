// huddle-common: shared types and utilities for the Huddle chat backend

pub mod protocol;
pub mod slug;
