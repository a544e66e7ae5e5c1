//! RetroWeb Gate - request admission for the RetroWeb builder API
//!
//! This crate implements a fixed-window rate limiter keyed by client and
//! policy, the axum middleware that applies it in front of API handlers, and a
//! small HTTP service that hands out admission decisions to other processes.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
