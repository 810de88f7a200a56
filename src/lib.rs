//! Encrypted point-to-point file copy over a framed TCP connection.
//!
//! [`net`] is the transport-agnostic core (framing, envelope cipher, the
//! client/server endpoints). [`proto`], [`copyfs`], [`dispatch`], and
//! [`history`] are the copy-protocol collaborator built on top of it.

pub mod config;
pub mod copyfs;
pub mod dispatch;
pub mod history;
pub mod net;
pub mod password;
pub mod pathspec;
pub mod proto;
