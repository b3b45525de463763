// Copyright 2026 Informe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Informe — resilient search-report acquisition service.
//!
//! Drives proxy-rotated, captcha-solving browser attempts to capture a
//! rendered search-result page as a PDF, with bounded retries,
//! telemetry, and a synthetic fallback report on exhaustion.
//!
//! This library crate exposes the core modules for integration testing.

pub mod attempt;
pub mod captcha;
pub mod config;
pub mod driver;
pub mod error;
pub mod fallback;
pub mod lookup;
pub mod orchestrator;
pub mod poll;
pub mod proxy;
pub mod rest;
pub mod telemetry;
