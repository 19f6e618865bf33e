//! HTTP API for the ExamMaster backend
//!
//! Public routes plus the auth routes from `exam_auth`, behind CORS for the
//! SPA. The `exam-api` binary wires these to Postgres and Redis.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
