pub mod blueprint; // Exam structure inferred from the live bank
pub mod extraction;
pub mod generator;
pub mod ingest; // Blocks → question records
pub mod outcome;
pub mod practice; // Timed sessions, scoring, analytics
pub mod processor; // Per-paper ingest orchestration
