//! Relational store for accounts, departments, academic records and
//! faculty-student associations.
//!
//! Everything lives in one libsql (SQLite) database, either a local file or
//! `:memory:` for development and tests. All statements are parameterized.
//!
//! Multi-statement mutations run through [`DbClient::begin`] and
//! [`DbClient::finish`], which commit on success and roll back on any error.

mod academics;
mod accounts;
mod associations;
mod client;
mod departments;
mod revocations;

pub use academics::{NewBatch, NewProgramme};
pub use client::{DbClient, DbTx, DbWriter};
pub use departments::{DepartmentChanges, HodAssignment};
