//! powledger - A toy proof-of-work ledger mined by concurrent agents
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger Core
//! - [`transaction`] - Transaction records and pool validation
//! - [`ledger`] - Pending pool, verified chain and proof of work
//!
//! ## Mining
//! - [`miner`] - Miner agents and the stop signal
//! - [`sync`] - Local chain resync and fork resolution
//!
//! ## Cryptography
//! - [`crypto`] - Identities, signatures and hashing (secp256k1)
//!
//! ## Simulation
//! - [`fixtures`] - Sample transaction sets and the fixture file
//! - [`simulation`] - Harness running agents against one ledger
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Core
// ============================================================================
pub mod ledger;
pub mod transaction;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;
pub mod sync;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Simulation
// ============================================================================
pub mod fixtures;
pub mod simulation;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
