// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod api;
pub mod assembly;
pub mod config;
pub mod error;
pub mod jobs;
pub mod manager;
pub mod metrics;
pub mod provenance;
pub mod storage;
pub mod transcoder;
