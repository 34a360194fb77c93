//! Inbound and outbound file formats for the CLI.

pub mod csv;
