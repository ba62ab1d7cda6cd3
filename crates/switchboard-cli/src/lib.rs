//! Switchboard CLI library: the command implementations behind the
//! `switchboard` binary, exposed so integration tests can drive them
//! without spawning a process.

pub mod commands;
