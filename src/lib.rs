//! A batch LDAP modification tool: reads LDIF change records and applies
//! them to a directory server, optionally grouped into a transaction or a
//! multi-update, with per-record request controls selected from the CLI.

pub mod cli;
pub mod composer;
pub mod config;
pub mod connection;
pub mod controls;
pub mod dn;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod ldif;
pub mod notifications;
pub mod output;
pub mod paged_search;
pub mod rate_limit;
pub mod reject;
pub mod result_model;
