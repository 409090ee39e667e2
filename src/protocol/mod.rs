//! Message model and wire frames for the RDS messaging channel
//!
//! [`messages`] holds the conversation data model kept by a session, and
//! [`frames`] holds the JSON text frames exchanged with the server.

pub mod frames;
pub mod messages;

pub use frames::*;
pub use messages::*;
