/*
 * Responsibility
 * - binary (server / mcp-token) と tests/ から使う module の公開
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
