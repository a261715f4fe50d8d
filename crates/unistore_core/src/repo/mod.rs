//! Repository contract and its backend adapters.
//!
//! # Responsibility
//! - Define the backend-agnostic CRUD contract (`contract`).
//! - Provide the shared filter/projection vocabulary (`query`).
//! - Implement the contract for SQLite (`sql_repo`) and MongoDB
//!   (`mongo_repo`).
//!
//! # Invariants
//! - "Not found" and "bad arguments" are distinct error kinds.
//! - Backend failures propagate unchanged inside `RepoError::Db`.

pub mod contract;
pub mod mongo_repo;
pub mod query;
pub mod sql_repo;
