//! Proxies for services every server provides.

pub mod krpc;
