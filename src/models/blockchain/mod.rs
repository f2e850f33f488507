//! Blockchain-specific model implementations.
//!
//! This module contains type definitions for the chains the access layer talks to.
//! Only EVM JSON-RPC nodes are supported.

pub mod evm;
