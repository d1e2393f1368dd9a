// Copyright (c) 2024-2025 LoomDB Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Operation lifecycle: the context each in-flight operation owns

pub mod context;

pub use context::OperationContext;
