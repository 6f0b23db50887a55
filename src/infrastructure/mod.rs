//! Adapters behind the domain ports: the HTTP backend client, the sandbox
//! ledger, and the gateway widgets.

pub mod gateway;
pub mod http_backend;
pub mod in_memory;
